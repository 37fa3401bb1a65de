//! Structured logging setup using tracing.
//!
//! Library code only emits `tracing` events. Host programs that want the
//! default output call [`init`] once at startup:
//! - human-readable console output, overridable with `RUST_LOG`
//! - optional JSON file output with rotation

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for JSON log files. `None` disables file output.
    pub log_directory: Option<PathBuf>,
    /// Log file name prefix (e.g., "tunegate" -> "tunegate.2024-01-15").
    pub log_file_prefix: String,
    /// Maximum log level for console output.
    pub console_level: Level,
    /// Maximum log level for file output.
    pub file_level: Level,
    /// How often to rotate log files.
    pub rotation: LogRotation,
    /// Whether to include ANSI color codes in console output.
    pub console_ansi: bool,
    /// Whether to include target module in console logs.
    pub include_target: bool,
}

/// Log rotation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    /// Create a new log file every hour.
    Hourly,
    /// Create a new log file every day.
    Daily,
    /// Never rotate (single log file).
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Self::HOURLY,
            LogRotation::Daily => Self::DAILY,
            LogRotation::Never => Self::NEVER,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LoggingConfig {
    /// Verbose console output, including extractor debugging.
    #[must_use]
    pub fn development() -> Self {
        Self {
            log_directory: None,
            log_file_prefix: "tunegate".to_string(),
            console_level: Level::DEBUG,
            file_level: Level::TRACE,
            rotation: LogRotation::Hourly,
            console_ansi: true,
            include_target: true,
        }
    }

    /// Info-level console output.
    #[must_use]
    pub fn production() -> Self {
        Self {
            log_directory: None,
            log_file_prefix: "tunegate".to_string(),
            console_level: Level::INFO,
            file_level: Level::DEBUG,
            rotation: LogRotation::Daily,
            console_ansi: true,
            include_target: false,
        }
    }

    /// Enable JSON file output in `path`.
    #[must_use]
    pub fn with_log_directory(mut self, path: PathBuf) -> Self {
        self.log_directory = Some(path);
        self
    }

    /// Set the console log level.
    #[must_use]
    pub const fn with_console_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }

    /// Set the log rotation frequency.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Keeps file logging alive. Drop it to flush pending entries.
pub struct LoggingGuard {
    file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("file_logging", &self.file_guard.is_some())
            .finish()
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| crate_filter(config.console_level));

    let console_layer = fmt::layer()
        .with_ansi(config.console_ansi)
        .with_target(config.include_target)
        .with_filter(console_filter);

    let (file_layer, file_guard) = match &config.log_directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|e| {
                LoggingError::DirectoryCreationFailed {
                    path: directory.clone(),
                    reason: e.to_string(),
                }
            })?;

            let appender = RollingFileAppender::new(
                config.rotation.into(),
                directory,
                &config.log_file_prefix,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(crate_filter(config.file_level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard { file_guard })
}

/// Warnings from dependencies, `level` for this crate.
fn crate_filter(level: Level) -> EnvFilter {
    EnvFilter::new(format!("warn,tunegate_core={}", level_to_directive(level)))
}

/// Convert a tracing Level to a filter directive string.
const fn level_to_directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

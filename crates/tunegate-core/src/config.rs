//! Intake configuration management.
//!
//! Handles loading and saving the settings read by the playlist extractor and
//! the admission checks. Every field has a default so a partial JSON file is
//! accepted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fs::{FileSystem, RealFileSystem};

/// Default number of extraction attempts per playlist.
pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 2;

/// Default maximum number of tracks taken from one playlist.
pub const DEFAULT_MAX_TRACK_PLAYLIST: usize = 20;

/// Default maximum track duration, in minutes.
pub const DEFAULT_MAX_TRACK_DURATION_MINUTES: u64 = 60;

/// Settings for the extraction engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractorSettings {
    /// Ask the extractor for verbose output.
    #[serde(default)]
    pub debug: bool,
    /// Cookie jar handed to the extractor.
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
    /// User-agent override.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// How many times a playlist extraction is attempted before giving up.
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,
    /// Pause between failed attempts, in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// Client impersonation hints passed to the extractor.
    #[serde(default = "default_player_clients")]
    pub player_clients: Vec<String>,
    /// Extractor program to run.
    #[serde(default = "default_program")]
    pub program: PathBuf,
}

const fn default_download_attempts() -> u32 {
    DEFAULT_DOWNLOAD_ATTEMPTS
}

fn default_player_clients() -> Vec<String> {
    vec!["ios".to_string(), "android".to_string()]
}

fn default_program() -> PathBuf {
    PathBuf::from("yt-dlp")
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            debug: false,
            cookie_file: None,
            user_agent: None,
            download_attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            retry_delay_ms: 0,
            player_clients: default_player_clients(),
            program: default_program(),
        }
    }
}

/// Limits applied when admitting tracks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdmissionSettings {
    /// Maximum number of tracks taken from a single playlist.
    #[serde(default = "default_max_track_playlist")]
    pub max_track_playlist: usize,
    /// Maximum track duration in minutes. Zero disables the limit.
    #[serde(default = "default_max_track_duration")]
    pub max_track_duration: u64,
}

const fn default_max_track_playlist() -> usize {
    DEFAULT_MAX_TRACK_PLAYLIST
}

const fn default_max_track_duration() -> u64 {
    DEFAULT_MAX_TRACK_DURATION_MINUTES
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            max_track_playlist: DEFAULT_MAX_TRACK_PLAYLIST,
            max_track_duration: DEFAULT_MAX_TRACK_DURATION_MINUTES,
        }
    }
}

impl AdmissionSettings {
    /// Maximum track duration in seconds, zero when unlimited.
    #[must_use]
    pub const fn max_duration_secs(&self) -> u64 {
        self.max_track_duration.saturating_mul(60)
    }
}

/// Intake configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntakeConfig {
    /// Directory where materialized tracks are cached.
    #[serde(default = "default_cache_directory")]
    pub cache_directory: PathBuf,
    /// Extraction engine settings.
    #[serde(default)]
    pub extractor: ExtractorSettings,
    /// Admission limits.
    #[serde(default)]
    pub admission: AdmissionSettings,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            cache_directory: default_cache_directory(),
            extractor: ExtractorSettings::default(),
            admission: AdmissionSettings::default(),
        }
    }
}

impl IntakeConfig {
    /// Load configuration from the default location, or defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, or defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// fails validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with(&RealFileSystem, path)
    }

    /// Load configuration through the given file system.
    ///
    /// # Errors
    ///
    /// See [`IntakeConfig::load_from`].
    pub fn load_with(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        if !fs.exists(path) {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs.read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;
        config.validate()?;

        info!("Loaded config from {}", path.display());
        debug!(
            attempts = config.extractor.download_attempts,
            max_tracks = config.admission.max_track_playlist,
            max_minutes = config.admission.max_track_duration,
            "Intake limits"
        );

        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its directory cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.save_with(&RealFileSystem, path)
    }

    /// Save configuration through the given file system.
    ///
    /// # Errors
    ///
    /// See [`IntakeConfig::save_to`].
    pub fn save_with(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !fs.exists(parent)
        {
            fs.create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs.write(path, &content)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Check that the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.extractor.download_attempts == 0 {
            return Err(Error::Configuration(
                "download_attempts must be at least 1".to_string(),
            ));
        }

        if !self.cache_directory.is_absolute() {
            return Err(Error::Configuration(format!(
                "Cache directory must be an absolute path: {}",
                self.cache_directory.display()
            )));
        }

        if self
            .extractor
            .user_agent
            .as_deref()
            .is_some_and(|ua| ua.trim().is_empty())
        {
            return Err(Error::Configuration(
                "user_agent must not be blank; omit it instead".to_string(),
            ));
        }

        if self
            .extractor
            .cookie_file
            .as_deref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err(Error::Configuration(
                "cookie_file must not be empty; omit it instead".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the path to the config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Get the default cache directory.
#[must_use]
pub fn default_cache_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tunegate")
        .join("cache")
}

fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("tunegate")
        .join("config.json")
}

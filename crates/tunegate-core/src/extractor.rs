//! Media extraction engine seam.
//!
//! The extraction engine is an opaque, unreliable capability: given a URL it
//! returns raw metadata or fails. [`MediaExtractor`] is the trait the
//! playlist pipeline talks to; [`YtDlpExtractor`] runs the `yt-dlp` program
//! and parses its single-JSON dump.
//!
//! ```rust,no_run
//! use tunegate_core::extractor::{ExtractOptions, MediaExtractor, YtDlpExtractor};
//!
//! let extractor = YtDlpExtractor::new("yt-dlp");
//! let info = extractor
//!     .extract_info("https://www.youtube.com/playlist?list=PLtest", &ExtractOptions::default())
//!     .unwrap();
//! println!("{} entries", info.entries.map_or(0, |e| e.len()));
//! ```

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::ExtractorSettings;
use crate::error::{ExtractionError, Result};

/// Options handed to the extraction engine for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// List playlist entries without resolving each video.
    pub flat_playlist: bool,
    /// Ask for verbose engine output.
    pub verbose: bool,
    /// Cookie jar file.
    pub cookie_file: Option<PathBuf>,
    /// User-agent override.
    pub user_agent: Option<String>,
    /// Player clients to impersonate, in preference order.
    pub player_clients: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from_settings(&ExtractorSettings::default())
    }
}

impl ExtractOptions {
    /// Build the options used for playlist extraction.
    #[must_use]
    pub fn from_settings(settings: &ExtractorSettings) -> Self {
        Self {
            flat_playlist: true,
            verbose: settings.debug,
            cookie_file: settings.cookie_file.clone(),
            user_agent: settings.user_agent.clone(),
            player_clients: settings.player_clients.clone(),
        }
    }
}

/// Raw metadata returned by the engine for a URL.
///
/// `entries` is `None` when the URL did not resolve to a playlist.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtractedPlaylist {
    /// Playlist title, if the engine reported one.
    #[serde(default)]
    pub title: Option<String>,
    /// Unnormalized playlist entries.
    #[serde(default)]
    pub entries: Option<Vec<serde_json::Value>>,
}

/// Extraction engine trait for testability.
#[cfg_attr(test, mockall::automock)]
pub trait MediaExtractor: Send + Sync {
    /// Fetch metadata for `url` without downloading media.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails for any reason.
    fn extract_info(&self, url: &str, options: &ExtractOptions) -> Result<ExtractedPlaylist>;
}

/// Extractor that runs the `yt-dlp` program.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: PathBuf,
}

impl YtDlpExtractor {
    /// Create an extractor that runs `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Create an extractor from configuration.
    #[must_use]
    pub fn from_settings(settings: &ExtractorSettings) -> Self {
        Self::new(settings.program.clone())
    }

    /// Command-line arguments for one extraction.
    fn command_args(url: &str, options: &ExtractOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--dump-single-json".into(), "--no-progress".into()];

        if options.flat_playlist {
            args.push("--flat-playlist".into());
        }
        if options.verbose {
            args.push("--verbose".into());
        }
        if let Some(cookie_file) = &options.cookie_file {
            args.push("--cookies".into());
            args.push(cookie_file.clone().into_os_string());
        }
        if let Some(user_agent) = &options.user_agent {
            args.push("--user-agent".into());
            args.push(user_agent.into());
        }
        if !options.player_clients.is_empty() {
            args.push("--extractor-args".into());
            args.push(format!("youtube:player_client={}", options.player_clients.join(",")).into());
        }

        args.push("--".into());
        args.push(url.into());
        args
    }

    fn parse_output(url: &str, stdout: &[u8]) -> Result<ExtractedPlaylist> {
        serde_json::from_slice(stdout).map_err(|e| {
            ExtractionError::InvalidOutput {
                url: url.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::from_settings(&ExtractorSettings::default())
    }
}

impl MediaExtractor for YtDlpExtractor {
    fn extract_info(&self, url: &str, options: &ExtractOptions) -> Result<ExtractedPlaylist> {
        let args = Self::command_args(url, options);
        debug!("Running {} for {}", self.program.display(), url);
        trace!(?args, "extractor arguments");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| ExtractionError::ToolUnavailable {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        if options.verbose && !output.stderr.is_empty() {
            debug!("{}", String::from_utf8_lossy(&output.stderr).trim_end());
        }

        if !output.status.success() {
            return Err(ExtractionError::ToolFailed {
                url: url.to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Self::parse_output(url, &output.stdout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn args_as_strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_default_options() {
        let options = ExtractOptions::default();
        assert!(options.flat_playlist);
        assert!(!options.verbose);
        assert_eq!(options.player_clients, vec!["ios", "android"]);
    }

    #[test]
    fn test_options_from_settings() {
        let settings = ExtractorSettings {
            debug: true,
            cookie_file: Some(PathBuf::from("/etc/cookies.txt")),
            user_agent: Some("agent/1.0".to_string()),
            ..Default::default()
        };
        let options = ExtractOptions::from_settings(&settings);

        assert!(options.verbose);
        assert_eq!(options.cookie_file, Some(PathBuf::from("/etc/cookies.txt")));
        assert_eq!(options.user_agent.as_deref(), Some("agent/1.0"));
    }

    #[test]
    fn test_command_args_minimal() {
        let options = ExtractOptions {
            player_clients: Vec::new(),
            ..Default::default()
        };
        let args = args_as_strings(&YtDlpExtractor::command_args("https://x/pl", &options));

        assert_eq!(
            args,
            vec![
                "--dump-single-json",
                "--no-progress",
                "--flat-playlist",
                "--",
                "https://x/pl"
            ]
        );
    }

    #[test]
    fn test_command_args_full() {
        let options = ExtractOptions {
            flat_playlist: true,
            verbose: true,
            cookie_file: Some(PathBuf::from("/c.txt")),
            user_agent: Some("UA".to_string()),
            player_clients: vec!["ios".to_string(), "android".to_string()],
        };
        let args = args_as_strings(&YtDlpExtractor::command_args("https://x/pl", &options));

        assert!(args.contains(&"--verbose".to_string()));
        let cookies = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[cookies + 1], "/c.txt");
        let ua = args.iter().position(|a| a == "--user-agent").unwrap();
        assert_eq!(args[ua + 1], "UA");
        assert!(args.contains(&"youtube:player_client=ios,android".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://x/pl"));
    }

    #[test]
    fn test_parse_output_playlist() {
        let json = br#"{"title":"Mix","entries":[{"url":"abc","title":"A"},{"url":"def"}]}"#;
        let info = YtDlpExtractor::parse_output("u", json).unwrap();

        assert_eq!(info.title.as_deref(), Some("Mix"));
        assert_eq!(info.entries.unwrap().len(), 2);
    }

    #[test]
    fn test_parse_output_single_video() {
        let json = br#"{"title":"Just a video","duration":120}"#;
        let info = YtDlpExtractor::parse_output("u", json).unwrap();
        assert!(info.entries.is_none());
    }

    #[test]
    fn test_parse_output_garbage() {
        let err = YtDlpExtractor::parse_output("u", b"<html>").unwrap_err();
        assert!(matches!(
            err,
            Error::Extraction(ExtractionError::InvalidOutput { .. })
        ));
    }

    #[test]
    fn test_missing_program_is_tool_unavailable() {
        let extractor = YtDlpExtractor::new("/nonexistent/tunegate-test-extractor");
        let err = extractor
            .extract_info("https://x/pl", &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Extraction(ExtractionError::ToolUnavailable { .. })
        ));
    }
}

//! Error types for Tunegate core operations.
//!
//! Errors are grouped by domain: extraction, validation, item records and the
//! file system. Validation errors carry user-facing text; the others are for
//! logs and callers.

use std::path::PathBuf;
use thiserror::Error;

use crate::item::format_time;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Tunegate core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The extraction engine failed.
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// An item was refused admission.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A persisted item record could not be used.
    #[error("Item error: {0}")]
    Item(#[from] ItemError),

    /// File system operation failed.
    #[error("File system error: {0}")]
    FileSystem(#[from] FileSystemError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns the validation failure, if this is one.
    #[must_use]
    pub const fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }
}

/// Failures of the external extraction engine.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extractor program could not be started.
    #[error("Cannot run {program}: {reason}")]
    ToolUnavailable {
        /// Program that was invoked.
        program: String,
        /// Why it could not be started.
        reason: String,
    },

    /// The extractor program exited unsuccessfully.
    #[error("Extractor exited with status {status:?} for {url}: {stderr}")]
    ToolFailed {
        /// URL being extracted.
        url: String,
        /// Exit code, if any.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The extractor produced output that is not a metadata document.
    #[error("Invalid extractor output for {url}: {reason}")]
    InvalidOutput {
        /// URL being extracted.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// A playlist entry could not be normalized.
    #[error("Malformed playlist entry #{index}: {reason}")]
    MalformedEntry {
        /// Position of the entry in the playlist.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },
}

/// Why an item was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    /// The URL is in the ban registry.
    UrlBanned,
    /// The track exceeds the configured maximum duration.
    TooLong,
}

impl ValidationReason {
    /// Stable machine-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UrlBanned => "url_banned",
            Self::TooLong => "too_long",
        }
    }
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item failed admission. The message is meant for the requesting user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The URL is banned.
    #[error("This URL is banned: {url}")]
    UrlBanned {
        /// Offending URL.
        url: String,
    },

    /// The track is longer than allowed and not whitelisted.
    #[error(
        "{song} is too long ({}/{}), removed from playlist",
        format_time(*.duration_secs),
        format_time(*.max_duration_secs)
    )]
    TooLong {
        /// Display title of the track.
        song: String,
        /// Duration reported by the playlist.
        duration_secs: u64,
        /// Configured limit.
        max_duration_secs: u64,
    },
}

impl ValidationError {
    /// The machine-readable reason for this failure.
    #[must_use]
    pub const fn reason(&self) -> ValidationReason {
        match self {
            Self::UrlBanned { .. } => ValidationReason::UrlBanned,
            Self::TooLong { .. } => ValidationReason::TooLong,
        }
    }
}

/// Problems with persisted item records.
#[derive(Debug, Error)]
pub enum ItemError {
    /// No loader or builder is registered for the type tag.
    #[error("Unknown item type: {0}")]
    UnknownType(String),

    /// The record is missing fields or has the wrong shape.
    #[error("Malformed {item_type} record: {reason}")]
    MalformedRecord {
        /// Type tag of the record.
        item_type: String,
        /// What was wrong.
        reason: String,
    },
}

/// File system errors.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Reading a file failed.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },

    /// Writing a file failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },

    /// Creating a directory failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },
}

//! `Tunegate` Core Library
//!
//! This crate takes playlists from an external extraction engine and decides
//! which of their tracks may be queued:
//! - Playlist intake with bounded retries and a per-playlist track cap
//! - Playable items that persist as flat JSON records
//! - Admission checks against ban lists, whitelists and a duration limit
//! - Intake configuration and logging setup
//!
//! # Error Handling
//!
//! Fallible operations return [`Result`]. Admission failures come back as
//! [`Error::Validation`] with a message that can be shown to the requester.
//!
//! ```rust,ignore
//! use tunegate_core::{ItemValidator, PlayableItem, Result};
//!
//! fn admit(validator: &ItemValidator, item: &dyn PlayableItem) -> Result<()> {
//!     validator.validate(item)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extractor;
pub mod fs;
pub mod item;
pub mod logging;
pub mod playlist;
pub mod playlist_item;
pub mod policy;
pub mod validator;

pub use config::{AdmissionSettings, ExtractorSettings, IntakeConfig, default_cache_directory};
pub use error::{
    Error, ExtractionError, FileSystemError, ItemError, Result, ValidationError, ValidationReason,
};
pub use extractor::{ExtractOptions, ExtractedPlaylist, MediaExtractor, YtDlpExtractor};
pub use fs::{FileSystem, RealFileSystem};
pub use item::{
    ItemBuilder, ItemLoader, ItemRecord, ItemRegistry, PlayableItem, Readiness, format_time,
    item_id,
};
pub use logging::{LogRotation, LoggingConfig, LoggingError, LoggingGuard};
pub use playlist::{
    PlaylistExtractor, PlaylistTracks, TrackDescriptor, UNKNOWN_PLAYLIST, UNKNOWN_TITLE,
    WATCH_URL_PREFIX, canonical_watch_url,
};
pub use playlist_item::PlaylistUrlItem;
pub use policy::{AdmissionPolicy, MemoryRegistry, RegistryPolicy, UrlRegistry};
pub use validator::ItemValidator;

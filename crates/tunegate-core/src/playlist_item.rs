//! Items sourced from a playlist.
//!
//! A [`PlaylistUrlItem`] is a URL item that remembers which playlist it came
//! from. Its duration comes from the playlist listing and is never re-fetched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{ItemError, Result, ValidationError};
use crate::fs::FileSystem;
use crate::item::{ItemRecord, PlayableItem, Readiness, TYPE_KEY, item_id};
use crate::playlist::TrackDescriptor;
use crate::policy::AdmissionPolicy;

/// Type tag of playlist-sourced URL items.
pub const ITEM_TYPE: &str = "url_from_playlist";

/// Mutable part of an item.
#[derive(Debug, Clone, Default)]
struct ItemState {
    readiness: Readiness,
    local_path: Option<PathBuf>,
    version: u64,
}

/// Persisted shape of a [`PlaylistUrlItem`].
#[derive(Debug, Deserialize)]
struct StoredItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    id: String,
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    playlist_url: String,
    #[serde(default)]
    playlist_title: String,
    #[serde(default)]
    ready: Readiness,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    user: String,
    #[serde(default)]
    thumbnail: Option<String>,
}

/// A track that was added as part of a playlist.
#[derive(Debug)]
pub struct PlaylistUrlItem {
    id: String,
    url: String,
    title: String,
    playlist_url: String,
    playlist_title: String,
    duration_secs: u64,
    submitted_by: String,
    thumbnail: Option<String>,
    state: RwLock<ItemState>,
    validating_lock: Mutex<()>,
}

impl PlaylistUrlItem {
    /// Create a fresh item whose file is expected under `cache_dir`.
    #[must_use]
    pub fn from_descriptor(descriptor: &TrackDescriptor, cache_dir: &Path) -> Self {
        if !descriptor.has_source_url() {
            warn!(
                "Creating item '{}' from playlist '{}' without a url",
                descriptor.title, descriptor.playlist_title
            );
        }
        let id = item_id(&descriptor.source_url);
        let local_path = descriptor.has_source_url().then(|| cache_dir.join(&id));

        Self {
            id,
            url: descriptor.source_url.clone(),
            title: descriptor.title.clone(),
            playlist_url: descriptor.playlist_url.clone(),
            playlist_title: descriptor.playlist_title.clone(),
            duration_secs: descriptor.duration_secs,
            submitted_by: descriptor.submitted_by.clone(),
            thumbnail: None,
            state: RwLock::new(ItemState {
                local_path,
                ..ItemState::default()
            }),
            validating_lock: Mutex::new(()),
        }
    }

    /// Restore an item from its persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MalformedRecord`] if required keys are missing,
    /// have the wrong type, or the type tag is not [`ITEM_TYPE`].
    pub fn from_record(record: &ItemRecord) -> Result<Self> {
        let malformed = |reason: String| ItemError::MalformedRecord {
            item_type: ITEM_TYPE.to_string(),
            reason,
        };

        let stored: StoredItem = serde_json::from_value(Value::Object(record.clone()))
            .map_err(|e| malformed(e.to_string()))?;
        if stored.item_type != ITEM_TYPE {
            return Err(malformed(format!("unexpected type '{}'", stored.item_type)).into());
        }

        let id = if stored.id.is_empty() {
            item_id(&stored.url)
        } else {
            stored.id
        };

        Ok(Self {
            id,
            url: stored.url,
            title: stored.title,
            playlist_url: stored.playlist_url,
            playlist_title: stored.playlist_title,
            duration_secs: stored.duration,
            submitted_by: stored.user,
            thumbnail: stored.thumbnail,
            state: RwLock::new(ItemState {
                readiness: stored.ready.persisted(),
                local_path: stored.path,
                version: 0,
            }),
            validating_lock: Mutex::new(()),
        })
    }

    /// [`crate::item::ItemBuilder`] for this kind.
    pub fn build(descriptor: &TrackDescriptor, cache_dir: &Path) -> Box<dyn PlayableItem> {
        Box::new(Self::from_descriptor(descriptor, cache_dir))
    }

    /// [`crate::item::ItemLoader`] for this kind.
    ///
    /// # Errors
    ///
    /// See [`PlaylistUrlItem::from_record`].
    pub fn load(record: &ItemRecord) -> Result<Box<dyn PlayableItem>> {
        Ok(Box::new(Self::from_record(record)?))
    }

    /// Attach a base64-encoded JPEG thumbnail.
    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    /// Track URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Track title as reported by the playlist.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// URL of the source playlist.
    #[must_use]
    pub fn playlist_url(&self) -> &str {
        &self.playlist_url
    }

    /// Title of the source playlist.
    #[must_use]
    pub fn playlist_title(&self) -> &str {
        &self.playlist_title
    }

    /// Duration reported by the playlist.
    #[must_use]
    pub const fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// Who added the playlist.
    #[must_use]
    pub fn submitted_by(&self) -> &str {
        &self.submitted_by
    }

    /// Base64 thumbnail, if any.
    #[must_use]
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ItemState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ItemState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_policy(
        &self,
        policy: &dyn AdmissionPolicy,
    ) -> std::result::Result<(), ValidationError> {
        if policy.is_banned(&self.url) {
            info!("url: {} is banned", self.url);
            return Err(ValidationError::UrlBanned {
                url: self.url.clone(),
            });
        }

        let max_duration_secs = policy.max_duration_secs();
        if max_duration_secs > 0
            && !policy.is_whitelisted(&self.url)
            && self.duration_secs > max_duration_secs
        {
            info!(
                "url: {} has a duration of {:.1} min -- too long",
                self.url,
                self.duration_secs as f64 / 60.0
            );
            return Err(ValidationError::TooLong {
                song: self.format_title(),
                duration_secs: self.duration_secs,
                max_duration_secs,
            });
        }

        Ok(())
    }
}

impl PlayableItem for PlaylistUrlItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &'static str {
        ITEM_TYPE
    }

    fn readiness(&self) -> Readiness {
        self.read_state().readiness
    }

    fn version(&self) -> u64 {
        self.read_state().version
    }

    fn local_path(&self) -> Option<PathBuf> {
        self.read_state().local_path.clone()
    }

    fn mark_ready(&self, path: PathBuf) {
        let mut state = self.write_state();
        state.readiness = Readiness::Ready;
        state.local_path = Some(path);
        state.version += 1;
    }

    fn validate(&self, policy: &dyn AdmissionPolicy, fs: &dyn FileSystem) -> Result<bool> {
        let _validating = self
            .validating_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let previous = self.readiness();
        if previous.is_admitted() {
            return Ok(true);
        }

        if let Some(path) = self.local_path()
            && fs.exists(&path)
        {
            debug!("{} already cached at {}", self.url, path.display());
            self.write_state().readiness = Readiness::Ready;
            return Ok(true);
        }

        self.write_state().readiness = Readiness::Validating;

        let outcome = self.check_policy(policy);

        // mark_ready may have run while the policy was consulted.
        let mut state = self.write_state();
        if state.readiness != Readiness::Validating {
            debug!(
                "{} became {} during validation, keeping it",
                self.url, state.readiness
            );
            return outcome.map(|()| true).map_err(Into::into);
        }

        match outcome {
            Ok(()) => {
                state.readiness = Readiness::Validated;
                state.version += 1;
                Ok(true)
            }
            Err(e) => {
                state.readiness = previous;
                Err(e.into())
            }
        }
    }

    fn to_record(&self) -> ItemRecord {
        let state = self.read_state();
        let mut record = ItemRecord::new();
        record.insert(TYPE_KEY.to_string(), json!(ITEM_TYPE));
        record.insert("id".to_string(), json!(self.id));
        record.insert("url".to_string(), json!(self.url));
        record.insert("title".to_string(), json!(self.title));
        record.insert("duration".to_string(), json!(self.duration_secs));
        record.insert("playlist_url".to_string(), json!(self.playlist_url));
        record.insert("playlist_title".to_string(), json!(self.playlist_title));
        record.insert("ready".to_string(), json!(state.readiness.persisted()));
        record.insert("path".to_string(), json!(state.local_path));
        record.insert("user".to_string(), json!(self.submitted_by));
        record.insert("thumbnail".to_string(), json!(self.thumbnail));
        record
    }

    fn format_title(&self) -> String {
        if self.title.is_empty() {
            self.url.clone()
        } else {
            self.title.clone()
        }
    }

    fn format_song_string(&self, user: &str) -> String {
        format!(
            "<a href=\"{}\">{}</a> <i>from playlist</i> <a href=\"{}\">{}</a> <i>added by</i> {}",
            self.url,
            self.format_title(),
            self.playlist_url,
            self.playlist_title,
            user
        )
    }

    fn format_current_playing(&self, user: &str) -> String {
        let mut display = format!("Now playing: {}", self.format_song_string(user));
        if let Some(thumbnail) = &self.thumbnail {
            display.push_str("<br /><img width=\"80\" src=\"data:image/jpeg;base64,");
            display.push_str(thumbnail);
            display.push_str("\"/>");
        }
        display
    }

    fn display_type(&self) -> &'static str {
        "from playlist"
    }
}

impl fmt::Display for PlaylistUrlItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[url] {} ({}) from playlist {}",
            self.title, self.url, self.playlist_title
        )
    }
}

//! Playable item model.
//!
//! Every kind of queueable item implements [`PlayableItem`] so the queue can
//! treat them uniformly. Items persist as flat JSON maps ([`ItemRecord`])
//! whose `type` key selects the loader in an [`ItemRegistry`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ItemError, Result};
use crate::fs::FileSystem;
use crate::playlist::TrackDescriptor;
use crate::playlist_item::{self, PlaylistUrlItem};
use crate::policy::AdmissionPolicy;

/// Flat key-value form of an item, as stored by the persistence layer.
pub type ItemRecord = serde_json::Map<String, serde_json::Value>;

/// Record key holding the type tag.
pub const TYPE_KEY: &str = "type";

/// Lifecycle stage of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Not checked yet.
    #[default]
    Unchecked,
    /// A validation is in progress.
    Validating,
    /// Admitted by policy, not materialized yet.
    Validated,
    /// Materialized in the cache and playable.
    Ready,
    /// Refused.
    Rejected,
}

impl Readiness {
    /// Whether an item in this state has already passed validation.
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        matches!(self, Self::Validated | Self::Ready)
    }

    /// The state written to persistent storage; in-flight states are not kept.
    #[must_use]
    pub const fn persisted(self) -> Self {
        match self {
            Self::Validating => Self::Unchecked,
            other => other,
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchecked => write!(f, "Unchecked"),
            Self::Validating => write!(f, "Validating"),
            Self::Validated => write!(f, "Validated"),
            Self::Ready => write!(f, "Ready"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Behaviour shared by all queueable item kinds.
pub trait PlayableItem: Send + Sync + fmt::Debug {
    /// Stable identifier.
    fn id(&self) -> &str;

    /// Type tag stored under [`TYPE_KEY`].
    fn type_tag(&self) -> &'static str;

    /// Current readiness.
    fn readiness(&self) -> Readiness;

    /// Counter bumped whenever the item must be persisted again.
    fn version(&self) -> u64;

    /// Cache location, if known.
    fn local_path(&self) -> Option<PathBuf>;

    /// Record the item as materialized at `path`.
    fn mark_ready(&self, path: PathBuf);

    /// Decide whether the item may be played.
    ///
    /// Returns `Ok(true)` when admitted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] when the item is refused.
    fn validate(&self, policy: &dyn AdmissionPolicy, fs: &dyn FileSystem) -> Result<bool>;

    /// Serialize to the persisted record form.
    fn to_record(&self) -> ItemRecord;

    /// Title for messages, falling back to the URL.
    fn format_title(&self) -> String;

    /// One-line description naming who added the item.
    fn format_song_string(&self, user: &str) -> String;

    /// "Now playing" text, with a thumbnail when one is known.
    fn format_current_playing(&self, user: &str) -> String;

    /// Human-readable name of the item kind.
    fn display_type(&self) -> &'static str;
}

/// Derive an item identifier from its URL.
#[must_use]
pub fn item_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Format seconds as `m:ss`, or `h:mm:ss` past an hour.
#[must_use]
pub fn format_time(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Builds an item of one kind from a fresh descriptor.
pub type ItemBuilder = fn(&TrackDescriptor, &Path) -> Box<dyn PlayableItem>;

/// Rebuilds an item of one kind from its persisted record.
pub type ItemLoader = fn(&ItemRecord) -> Result<Box<dyn PlayableItem>>;

#[derive(Clone, Copy)]
struct ItemKind {
    build: ItemBuilder,
    load: ItemLoader,
}

/// Maps type tags to item constructors.
#[derive(Clone, Default)]
pub struct ItemRegistry {
    kinds: HashMap<&'static str, ItemKind>,
}

impl ItemRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry knowing every item kind in this crate.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            playlist_item::ITEM_TYPE,
            PlaylistUrlItem::build,
            PlaylistUrlItem::load,
        );
        registry
    }

    /// Register (or replace) the constructors for `type_tag`.
    pub fn register(&mut self, type_tag: &'static str, build: ItemBuilder, load: ItemLoader) {
        self.kinds.insert(type_tag, ItemKind { build, load });
    }

    /// Whether `type_tag` is known.
    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.kinds.contains_key(type_tag)
    }

    /// Build a fresh item of kind `type_tag`, caching under `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::UnknownType`] if the kind is not registered.
    pub fn build(
        &self,
        type_tag: &str,
        descriptor: &TrackDescriptor,
        cache_dir: &Path,
    ) -> Result<Box<dyn PlayableItem>> {
        let kind = self
            .kinds
            .get(type_tag)
            .ok_or_else(|| ItemError::UnknownType(type_tag.to_string()))?;
        Ok((kind.build)(descriptor, cache_dir))
    }

    /// Rebuild an item from its persisted record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no known type tag or is malformed.
    pub fn load(&self, record: &ItemRecord) -> Result<Box<dyn PlayableItem>> {
        let type_tag = record
            .get(TYPE_KEY)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ItemError::MalformedRecord {
                item_type: "unknown".to_string(),
                reason: format!("missing '{TYPE_KEY}' key"),
            })?;
        let kind = self
            .kinds
            .get(type_tag)
            .ok_or_else(|| ItemError::UnknownType(type_tag.to_string()))?;
        (kind.load)(record)
    }
}

impl fmt::Debug for ItemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.kinds.keys().collect();
        tags.sort_unstable();
        f.debug_struct("ItemRegistry").field("kinds", &tags).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    fn descriptor() -> TrackDescriptor {
        TrackDescriptor {
            source_url: "https://www.youtube.com/watch?v=abc".to_string(),
            title: "Song".to_string(),
            playlist_url: "https://www.youtube.com/playlist?list=PL1".to_string(),
            playlist_title: "Mix".to_string(),
            submitted_by: "carol".to_string(),
            duration_secs: 42,
        }
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(59), "0:59");
        assert_eq!(format_time(600), "10:00");
        assert_eq!(format_time(700), "11:40");
        assert_eq!(format_time(3661), "1:01:01");
    }

    #[test]
    fn test_item_id_is_stable_hex() {
        let id = item_id("https://www.youtube.com/watch?v=abc");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, item_id("https://www.youtube.com/watch?v=abc"));
        assert_ne!(id, item_id("https://www.youtube.com/watch?v=abd"));
    }

    #[test]
    fn test_readiness_serialization() {
        assert_eq!(
            serde_json::to_value(Readiness::Validated).unwrap(),
            json!("validated")
        );
        let parsed: Readiness = serde_json::from_value(json!("ready")).unwrap();
        assert_eq!(parsed, Readiness::Ready);
    }

    #[test]
    fn test_readiness_helpers() {
        assert!(Readiness::Ready.is_admitted());
        assert!(Readiness::Validated.is_admitted());
        assert!(!Readiness::Unchecked.is_admitted());
        assert!(!Readiness::Validating.is_admitted());
        assert_eq!(Readiness::Validating.persisted(), Readiness::Unchecked);
        assert_eq!(Readiness::Ready.persisted(), Readiness::Ready);
    }

    #[test]
    fn test_registry_build_and_load() {
        let registry = ItemRegistry::with_defaults();
        assert!(registry.contains(playlist_item::ITEM_TYPE));

        let item = registry
            .build(playlist_item::ITEM_TYPE, &descriptor(), Path::new("/cache"))
            .unwrap();
        assert_eq!(item.type_tag(), "url_from_playlist");

        let loaded = registry.load(&item.to_record()).unwrap();
        assert_eq!(loaded.id(), item.id());
        assert_eq!(loaded.to_record(), item.to_record());
    }

    #[test]
    fn test_registry_unknown_type() {
        let registry = ItemRegistry::with_defaults();

        let err = registry
            .build("radio", &descriptor(), Path::new("/cache"))
            .unwrap_err();
        assert!(matches!(err, Error::Item(ItemError::UnknownType(ref t)) if t == "radio"));

        let mut record = ItemRecord::new();
        record.insert(TYPE_KEY.to_string(), json!("radio"));
        assert!(registry.load(&record).is_err());
    }

    #[test]
    fn test_registry_missing_type_key() {
        let registry = ItemRegistry::with_defaults();
        let err = registry.load(&ItemRecord::new()).unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn test_empty_registry_knows_nothing() {
        let registry = ItemRegistry::new();
        assert!(!registry.contains(playlist_item::ITEM_TYPE));
        assert!(format!("{registry:?}").contains("ItemRegistry"));
    }
}

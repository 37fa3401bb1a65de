//! Admission policy.
//!
//! The validator asks three questions: how long may a track be, is this URL
//! banned, is this URL whitelisted. [`AdmissionPolicy`] is that capability;
//! [`RegistryPolicy`] answers it from the configured limit and two URL
//! registries owned elsewhere.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::AdmissionSettings;

/// Read-only admission checks consulted during validation.
#[cfg_attr(test, mockall::automock)]
pub trait AdmissionPolicy: Send + Sync {
    /// Maximum track duration in seconds. Zero means unlimited.
    fn max_duration_secs(&self) -> u64;

    /// Whether `url` may never be played.
    fn is_banned(&self, url: &str) -> bool;

    /// Whether `url` bypasses the duration limit.
    fn is_whitelisted(&self, url: &str) -> bool;
}

/// A set of URLs, such as a ban list or whitelist.
pub trait UrlRegistry: Send + Sync {
    /// Whether `url` is in the registry.
    fn has(&self, url: &str) -> bool;
}

/// In-memory [`UrlRegistry`].
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    urls: RwLock<HashSet<String>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a URL. Returns `false` if it was already present.
    pub fn insert(&self, url: impl Into<String>) -> bool {
        self.urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into())
    }

    /// Remove a URL. Returns `false` if it was not present.
    pub fn remove(&self, url: &str) -> bool {
        self.urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url)
    }

    /// Number of URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UrlRegistry for MemoryRegistry {
    fn has(&self, url: &str) -> bool {
        self.urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }
}

impl<S: Into<String>> FromIterator<S> for MemoryRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            urls: RwLock::new(iter.into_iter().map(Into::into).collect()),
        }
    }
}

/// [`AdmissionPolicy`] built from configuration and two registries.
#[derive(Clone)]
pub struct RegistryPolicy {
    max_duration_secs: u64,
    bans: Arc<dyn UrlRegistry>,
    whitelist: Arc<dyn UrlRegistry>,
}

impl RegistryPolicy {
    /// Create a policy from admission settings and registries.
    #[must_use]
    pub fn new(
        settings: &AdmissionSettings,
        bans: Arc<dyn UrlRegistry>,
        whitelist: Arc<dyn UrlRegistry>,
    ) -> Self {
        Self {
            max_duration_secs: settings.max_duration_secs(),
            bans,
            whitelist,
        }
    }
}

impl std::fmt::Debug for RegistryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryPolicy")
            .field("max_duration_secs", &self.max_duration_secs)
            .finish_non_exhaustive()
    }
}

impl AdmissionPolicy for RegistryPolicy {
    fn max_duration_secs(&self) -> u64 {
        self.max_duration_secs
    }

    fn is_banned(&self, url: &str) -> bool {
        self.bans.has(url)
    }

    fn is_whitelisted(&self, url: &str) -> bool {
        self.whitelist.has(url)
    }
}

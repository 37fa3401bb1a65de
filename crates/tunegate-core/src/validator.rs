//! Item validation entry point.
//!
//! [`ItemValidator`] owns the admission policy and file system handles so
//! callers only pass the item. The per-item locking and state transitions
//! live in the item kinds themselves.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::item::PlayableItem;
use crate::policy::AdmissionPolicy;

/// Validates items against a fixed policy.
#[derive(Clone)]
pub struct ItemValidator {
    policy: Arc<dyn AdmissionPolicy>,
    fs: Arc<dyn FileSystem>,
}

impl ItemValidator {
    /// Create a validator using the real file system for cache checks.
    #[must_use]
    pub fn new(policy: Arc<dyn AdmissionPolicy>) -> Self {
        Self::with_file_system(policy, Arc::new(RealFileSystem))
    }

    /// Create a validator with an explicit file system.
    #[must_use]
    pub fn with_file_system(policy: Arc<dyn AdmissionPolicy>, fs: Arc<dyn FileSystem>) -> Self {
        Self { policy, fs }
    }

    /// Validate `item`. Safe to call concurrently and repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] if the item must not be played.
    pub fn validate(&self, item: &dyn PlayableItem) -> Result<bool> {
        let result = item.validate(&*self.policy, &*self.fs);
        match &result {
            Ok(_) => debug!(
                item = item.id(),
                readiness = %item.readiness(),
                "validated {}",
                item.format_title()
            ),
            Err(e) => warn!(item = item.id(), "rejected {}: {}", item.format_title(), e),
        }
        result
    }
}

impl std::fmt::Debug for ItemValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemValidator").finish_non_exhaustive()
    }
}

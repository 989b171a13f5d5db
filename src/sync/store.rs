//! Shared health state store abstraction.
//!
//! # Responsibilities
//! - Read one endpoint's shared record, treating expired records as absent
//! - Write with optimistic concurrency on the record's `updated_at`
//! - Stamp a fresh expiry on every write
//!
//! # Design Decisions
//! - The version token is `updated_at` itself, compared for equality only
//! - Conflicts are reported, never retried here

use async_trait::async_trait;
use thiserror::Error;

use crate::sync::record::{SharedHealthRecord, StateKey};

/// Errors from a shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored `updated_at` no longer matches the one the writer read.
    #[error("Version conflict: expected updated_at {expected}, found {actual:?}")]
    VersionConflict { expected: u64, actual: Option<u64> },

    /// The backing store is unreachable or failed.
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cross-instance storage for merged endpoint health.
#[async_trait]
pub trait HealthStateStore: Send + Sync {
    /// Current record for `key`, or `None` if missing or expired.
    async fn read(&self, key: &StateKey) -> Result<Option<SharedHealthRecord>, StoreError>;

    /// Store `record` under `key`.
    ///
    /// With `previous_version = None` the write is an unconditional upsert.
    /// Otherwise it applies only if the stored `updated_at` equals
    /// `previous_version`, and fails with [`StoreError::VersionConflict`].
    async fn write(
        &self,
        key: &StateKey,
        record: SharedHealthRecord,
        previous_version: Option<u64>,
    ) -> Result<(), StoreError>;
}

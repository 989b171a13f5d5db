//! In-process shared store.
//!
//! Shared by every router of one process. Useful for a single instance and
//! as the store in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;

use crate::sync::record::{expiry_for, now_secs, SharedHealthRecord, StateKey};
use crate::sync::store::{HealthStateStore, StoreError};

/// [`HealthStateStore`] backed by a concurrent map.
#[derive(Debug)]
pub struct MemoryStateStore {
    records: DashMap<String, SharedHealthRecord>,
    ttl: Duration,
}

impl MemoryStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl HealthStateStore for MemoryStateStore {
    async fn read(&self, key: &StateKey) -> Result<Option<SharedHealthRecord>, StoreError> {
        let now = now_secs();
        Ok(self
            .records
            .get(&key.to_string())
            .map(|entry| entry.value().clone())
            .filter(|record| !record.is_expired(now)))
    }

    async fn write(
        &self,
        key: &StateKey,
        mut record: SharedHealthRecord,
        previous_version: Option<u64>,
    ) -> Result<(), StoreError> {
        record.ttl = expiry_for(record.updated_at, self.ttl);
        let id = key.to_string();

        let Some(expected) = previous_version else {
            self.records.insert(id, record);
            return Ok(());
        };

        // The shard lock is held from compare to write.
        match self.records.get_mut(&id) {
            Some(mut current) if current.updated_at == expected => {
                *current = record;
                Ok(())
            }
            Some(current) => Err(StoreError::VersionConflict {
                expected,
                actual: Some(current.updated_at),
            }),
            None => Err(StoreError::VersionConflict {
                expected,
                actual: None,
            }),
        }
    }
}

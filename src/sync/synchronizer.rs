//! Reconciles one endpoint's local score with the shared store.
//!
//! # Data Flow
//! ```text
//! maybe_sync(delta, snapshot, sample)
//!     → rate limit (sync_interval since last successful sync)
//!     → read shared record (failure = absent)
//!     → merged = prior.score + delta, or snapshot if no prior
//!     → merge latency history within the window
//!     → conditional write on prior.updated_at
//! ```
//!
//! # Design Decisions
//! - Instances add their own marginal change, never overwrite others'
//! - A failed sync leaves bookkeeping untouched; the delta is reported next time
//! - Never called from the request path

use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::sync::record::{now_millis, LatencySample, SharedHealthRecord, StateKey};
use crate::sync::store::{HealthStateStore, StoreError};

/// Result of one sync attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub synced: bool,
    /// Merged score if synced, otherwise the local snapshot.
    pub health_score: f64,
    /// Merged latency history if synced, otherwise empty.
    pub latency_history: Vec<LatencySample>,
}

impl SyncOutcome {
    fn skipped(snapshot: f64) -> Self {
        Self {
            synced: false,
            health_score: snapshot,
            latency_history: Vec::new(),
        }
    }
}

/// Per-endpoint synchronizer against a [`HealthStateStore`].
pub struct HealthStateSynchronizer {
    key: StateKey,
    store: Arc<dyn HealthStateStore>,
    sync_interval: Duration,
    latency_history_window: Duration,
    last_sync_ms: Option<u64>,
}

impl HealthStateSynchronizer {
    pub fn new(
        key: StateKey,
        store: Arc<dyn HealthStateStore>,
        sync_interval: Duration,
        latency_history_window: Duration,
    ) -> Self {
        Self {
            key,
            store,
            sync_interval,
            latency_history_window,
            last_sync_ms: None,
        }
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }

    /// Wall-clock time of the last successful sync, epoch milliseconds.
    pub fn last_sync_ms(&self) -> Option<u64> {
        self.last_sync_ms
    }

    /// Whether a sync would be attempted at `now_ms`.
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_sync_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.sync_interval.as_millis() as u64,
            None => true,
        }
    }

    pub async fn maybe_sync(
        &mut self,
        local_delta: f64,
        local_snapshot: f64,
        latest_sample: Option<&LatencySample>,
    ) -> SyncOutcome {
        self.maybe_sync_at(now_millis(), local_delta, local_snapshot, latest_sample)
            .await
    }

    /// [`maybe_sync`](Self::maybe_sync) with an explicit wall-clock time.
    pub async fn maybe_sync_at(
        &mut self,
        now_ms: u64,
        local_delta: f64,
        local_snapshot: f64,
        latest_sample: Option<&LatencySample>,
    ) -> SyncOutcome {
        if !self.is_due(now_ms) {
            return SyncOutcome::skipped(local_snapshot);
        }

        let prior = match self.store.read(&self.key).await {
            Ok(prior) => prior,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Shared health read failed, treating as absent");
                None
            }
        };

        let (health_score, previous_version, history) = match prior {
            Some(record) => (
                (record.health_score + local_delta).min(0.0),
                Some(record.updated_at),
                record.latency_history,
            ),
            None => (local_snapshot, None, Vec::new()),
        };
        let latency_history =
            merge_latency_history(history, latest_sample, now_ms, self.latency_history_window);

        // Keep the version token strictly increasing even within one millisecond.
        let updated_at = match previous_version {
            Some(prev) if prev >= now_ms => prev + 1,
            _ => now_ms,
        };
        let record = SharedHealthRecord::new(health_score, latency_history.clone(), updated_at);

        match self.store.write(&self.key, record, previous_version).await {
            Ok(()) => {
                self.last_sync_ms = Some(now_ms);
                metrics::record_sync("synced");
                tracing::debug!(key = %self.key, health_score, local_delta, "Synced shared health");
                SyncOutcome {
                    synced: true,
                    health_score,
                    latency_history,
                }
            }
            Err(StoreError::VersionConflict { expected, actual }) => {
                metrics::record_sync("conflict");
                tracing::debug!(key = %self.key, expected, ?actual, "Shared health changed concurrently, retrying next cycle");
                SyncOutcome::skipped(local_snapshot)
            }
            Err(e) => {
                metrics::record_sync("error");
                tracing::warn!(key = %self.key, error = %e, "Shared health write failed");
                SyncOutcome::skipped(local_snapshot)
            }
        }
    }
}

impl std::fmt::Debug for HealthStateSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthStateSynchronizer")
            .field("key", &self.key.to_string())
            .field("last_sync_ms", &self.last_sync_ms)
            .finish_non_exhaustive()
    }
}

/// Prior history within the window plus `sample`, unique and ordered by timestamp.
pub fn merge_latency_history(
    mut history: Vec<LatencySample>,
    sample: Option<&LatencySample>,
    now_ms: u64,
    window: Duration,
) -> Vec<LatencySample> {
    let oldest = now_ms.saturating_sub(window.as_millis() as u64);
    history.retain(|s| s.timestamp_ms >= oldest);

    if let Some(sample) = sample {
        if sample.timestamp_ms >= oldest && !history.iter().any(|s| s.timestamp_ms == sample.timestamp_ms) {
            history.push(sample.clone());
        }
    }

    history.sort_by_key(|s| s.timestamp_ms);
    history.dedup_by_key(|s| s.timestamp_ms);
    history
}

//! Background shared-state synchronization.
//!
//! # Responsibilities
//! - Periodically sync every endpoint tracker of every group
//! - Write merged scores back into the trackers
//! - Stop on shutdown

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::SyncConfig;
use crate::health::EndpointHealthTracker;
use crate::registry::GatewayRegistry;
use crate::sync::record::{now_millis, StateKey};
use crate::sync::store::HealthStateStore;
use crate::sync::synchronizer::{HealthStateSynchronizer, SyncOutcome};

struct TrackedEndpoint {
    tracker: Arc<EndpointHealthTracker>,
    synchronizer: HealthStateSynchronizer,
}

/// Periodic task syncing all trackers against one shared store.
pub struct SyncService {
    endpoints: Vec<TrackedEndpoint>,
    tick: Duration,
}

impl SyncService {
    pub fn new(registry: &GatewayRegistry, store: Arc<dyn HealthStateStore>, config: &SyncConfig) -> Self {
        let endpoints = registry
            .routers()
            .flat_map(|router| router.trackers())
            .map(|tracker| TrackedEndpoint {
                tracker: Arc::clone(tracker),
                synchronizer: HealthStateSynchronizer::new(
                    StateKey::for_endpoint(tracker.chain(), tracker.identity()),
                    Arc::clone(&store),
                    config.sync_interval(),
                    config.latency_history_window(),
                ),
            })
            .collect();

        Self {
            endpoints,
            tick: Duration::from_millis(config.tick_ms),
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            endpoints = self.endpoints.len(),
            tick_ms = self.tick.as_millis() as u64,
            "Health sync service starting"
        );

        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync_due().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health sync service received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Sync every endpoint whose interval has elapsed. Returns how many synced.
    pub async fn sync_due(&mut self) -> usize {
        let mut synced = 0;
        for endpoint in &mut self.endpoints {
            if sync_endpoint(&endpoint.tracker, &mut endpoint.synchronizer).await.synced {
                synced += 1;
            }
        }
        synced
    }
}

/// Sync one tracker and adopt the merged score on success.
pub async fn sync_endpoint(
    tracker: &EndpointHealthTracker,
    synchronizer: &mut HealthStateSynchronizer,
) -> SyncOutcome {
    let now = now_millis();
    let snapshot = tracker.sync_snapshot();
    if !synchronizer.is_due(now) {
        return SyncOutcome {
            synced: false,
            health_score: snapshot.score,
            latency_history: Vec::new(),
        };
    }

    let outcome = synchronizer
        .maybe_sync_at(now, snapshot.delta, snapshot.score, snapshot.latest_sample.as_ref())
        .await;
    if outcome.synced {
        tracker.adopt_merged_score(outcome.health_score, snapshot.score);
    }
    outcome
}

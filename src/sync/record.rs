//! Shared health record and its key.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::blockchain::{ChainId, EndpointIdentity};

/// Store key for one endpoint of one group, rendered as `"{chain}_{provider}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub chain: ChainId,
    pub provider: String,
}

impl StateKey {
    pub fn new(chain: ChainId, provider: impl Into<String>) -> Self {
        Self {
            chain,
            provider: provider.into(),
        }
    }

    pub fn for_endpoint(chain: ChainId, endpoint: &EndpointIdentity) -> Self {
        Self::new(chain, endpoint.provider_name())
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.chain, self.provider)
    }
}

/// One observed call latency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySample {
    /// Completion time, milliseconds since the Unix epoch. Unique per history.
    pub timestamp_ms: u64,
    pub latency_ms: u64,
    pub api_name: String,
}

/// Health state of one endpoint as seen by every gateway instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedHealthRecord {
    /// Last merged score, never above 0.
    pub health_score: f64,

    /// Recent latency samples, ordered and unique by timestamp.
    #[serde(default)]
    pub latency_history: Vec<LatencySample>,

    /// Time of the last successful write in epoch milliseconds. Doubles as the
    /// optimistic-concurrency version token.
    pub updated_at: u64,

    /// Expiry in epoch seconds. Set by the store on every write.
    pub ttl: u64,
}

impl SharedHealthRecord {
    pub fn new(health_score: f64, latency_history: Vec<LatencySample>, updated_at: u64) -> Self {
        Self {
            health_score,
            latency_history,
            updated_at,
            ttl: 0,
        }
    }

    /// Whether the record has expired as of `now_secs`.
    pub fn is_expired(&self, now_secs: u64) -> bool {
        self.ttl < now_secs
    }
}

/// Expiry (epoch seconds) for a record written at `updated_at_ms`.
pub fn expiry_for(updated_at_ms: u64, ttl: Duration) -> u64 {
    updated_at_ms / 1000 + ttl.as_secs()
}

/// Wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Wall-clock time in epoch seconds.
pub fn now_secs() -> u64 {
    now_millis() / 1000
}

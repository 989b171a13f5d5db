//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the RPC gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Endpoint groups, one per chain.
    pub groups: Vec<GroupConfig>,

    /// Health scoring parameters shared by every group without an override.
    pub health: HealthScoringConfig,

    /// Routing behavior shared by every group without an override.
    pub routing: RoutingConfig,

    /// Cross-instance health synchronization.
    pub sync: SyncConfig,

    /// Outbound RPC client settings.
    pub rpc: RpcClientConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Scoring parameters in effect for `group`.
    pub fn health_for(&self, group: &GroupConfig) -> HealthScoringConfig {
        group.health.clone().unwrap_or_else(|| self.health.clone())
    }

    /// Routing behavior in effect for `group`.
    pub fn routing_for(&self, group: &GroupConfig) -> RoutingConfig {
        group.routing.clone().unwrap_or_else(|| self.routing.clone())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed for one inbound request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// One logical group of interchangeable endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupConfig {
    /// Chain served by this group.
    pub chain_id: u64,

    /// Upstream endpoints, in default precedence order.
    pub endpoints: Vec<EndpointConfig>,

    /// Pin calls to the last used endpoint instead of switching automatically.
    #[serde(default)]
    pub sticky: bool,

    /// Group-specific scoring parameters.
    #[serde(default)]
    pub health: Option<HealthScoringConfig>,

    /// Group-specific routing behavior.
    #[serde(default)]
    pub routing: Option<RoutingConfig>,
}

impl GroupConfig {
    pub fn new(chain_id: u64, endpoints: Vec<EndpointConfig>) -> Self {
        Self {
            chain_id,
            endpoints,
            sticky: false,
            health: None,
            routing: None,
        }
    }
}

/// Upstream endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// JSON-RPC URL.
    pub url: String,

    /// Preference rank, 0 = most preferred. Defaults to the list position.
    #[serde(default)]
    pub precedence: Option<u32>,

    /// Selection weight. Weighted selection applies only when every endpoint
    /// of the group has one.
    #[serde(default)]
    pub weight: Option<f64>,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            precedence: None,
            weight: None,
        }
    }
}

/// Health scoring parameters.
///
/// Penalties are negative deltas. `fallback_threshold < recover_threshold <= 0`
/// gives the hysteresis band between dropping out and coming back.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthScoringConfig {
    /// Score delta for a failed call.
    pub error_penalty: f64,

    /// Score delta for a successful call slower than `max_latency_allowed_ms`.
    pub high_latency_penalty: f64,

    /// Latency above which a successful call is penalized.
    pub max_latency_allowed_ms: u64,

    /// A healthy endpoint whose score drops below this starts recovering.
    pub fallback_threshold: f64,

    /// A recovering endpoint whose score rises above this is healthy again.
    pub recover_threshold: f64,

    /// Score regained per millisecond of idle time before a successful call.
    pub recover_score_per_ms: f64,

    /// Minimum idle time before an unhealthy endpoint is probed.
    pub recover_evaluation_wait_period_ms: u64,

    /// Upper bound on the idle time credited to a single successful call.
    pub max_recover_wait_ms: Option<u64>,

    /// Minimum time between two shadow latency evaluations of one endpoint.
    pub latency_evaluation_wait_period_ms: u64,
}

impl HealthScoringConfig {
    pub fn max_latency_allowed(&self) -> Duration {
        Duration::from_millis(self.max_latency_allowed_ms)
    }

    pub fn recover_evaluation_wait_period(&self) -> Duration {
        Duration::from_millis(self.recover_evaluation_wait_period_ms)
    }

    pub fn latency_evaluation_wait_period(&self) -> Duration {
        Duration::from_millis(self.latency_evaluation_wait_period_ms)
    }

    pub fn max_recover_wait(&self) -> Option<Duration> {
        self.max_recover_wait_ms.map(Duration::from_millis)
    }
}

impl Default for HealthScoringConfig {
    fn default() -> Self {
        Self {
            error_penalty: -50.0,
            high_latency_penalty: -20.0,
            max_latency_allowed_ms: 4_000,
            fallback_threshold: -70.0,
            recover_threshold: -10.0,
            recover_score_per_ms: 0.01,
            recover_evaluation_wait_period_ms: 10_000,
            max_recover_wait_ms: Some(60_000),
            latency_evaluation_wait_period_ms: 60_000,
        }
    }
}

/// Session affinity and sampled background checks of one group.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RoutingConfig {
    /// Maximum number of sessions remembered; the least recently used is evicted.
    pub session_capacity: usize,

    /// Let a session move to another endpoint when its pinned one is unhealthy.
    /// When false such calls fail instead.
    pub session_fallback_when_unhealthy: bool,

    /// Chance that an idle unhealthy endpoint is probed on a partitioning pass.
    pub health_check_sample_prob: f64,

    /// Mirror sampled calls to the other healthy endpoints to measure them.
    pub enable_shadow_latency_evaluation: bool,

    /// Chance that a served call is mirrored.
    pub latency_evaluation_sample_prob: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            session_capacity: 1_000,
            session_fallback_when_unhealthy: true,
            health_check_sample_prob: 1.0,
            enable_shadow_latency_evaluation: true,
            latency_evaluation_sample_prob: 0.0,
        }
    }
}

/// Which shared store backs health synchronization.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map; useful for a single instance and for tests.
    Memory,
    /// SQLite database file shared by instances on the same host or volume.
    Sqlite,
}

/// Cross-instance health synchronization settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Enable the background synchronization task.
    pub enabled: bool,

    /// Shared store implementation.
    pub store: StoreBackend,

    /// Database path for the SQLite store.
    pub sqlite_path: String,

    /// Minimum time between two syncs of the same endpoint, in seconds.
    pub sync_interval_secs: u64,

    /// Trailing window of latency samples kept in the shared record, in seconds.
    pub latency_history_window_secs: u64,

    /// Lifetime of a shared record after its last write, in seconds.
    pub record_ttl_secs: u64,

    /// How often the background task wakes up to check due syncs, in milliseconds.
    pub tick_ms: u64,
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn latency_history_window(&self) -> Duration {
        Duration::from_secs(self.latency_history_window_secs)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            store: StoreBackend::Memory,
            sqlite_path: "rpc_health.db".to_string(),
            sync_interval_secs: 60,
            latency_history_window_secs: 180,
            record_ttl_secs: 300,
            tick_ms: 1_000,
        }
    }
}

/// Outbound RPC client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcClientConfig {
    /// Per-call timeout in seconds. A timed-out call counts as a failure.
    pub timeout_secs: u64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

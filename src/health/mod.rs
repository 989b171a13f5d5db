//! Endpoint health subsystem.
//!
//! # Data Flow
//! ```text
//! Router picks endpoint
//!     → tracker.rs (record idle gap, run call, record outcome)
//!     → state.rs (score the call, maybe flip classification)
//!     → Router re-partitions healthy / unhealthy
//!
//! Unhealthy endpoint idle long enough:
//!     → tracker.rs background probe (eth_blockNumber)
//!     → same scoring path as a real call
//!
//! Sampled call served by another healthy endpoint:
//!     → tracker.rs shadow latency evaluation (same method, mirrored)
//!     → same scoring path as a real call
//! ```
//!
//! # Design Decisions
//! - Passive only: endpoints are scored by the traffic they serve
//! - Probes and shadow calls go through the same path as client calls
//! - Health state is per-endpoint, not per-group

pub mod state;
pub mod tracker;

pub use state::{CallVerdict, HealthState, ScoreCard};
pub use tracker::{EndpointHealthTracker, EndpointStatus, SyncSnapshot, PROBE_METHOD};

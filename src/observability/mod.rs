//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Trackers, router, sync service, HTTP server produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields, never string-formatted messages
//! - Metrics are cheap no-ops until an exporter is installed
//! - Labels identify group (chain id) and endpoint (provider name)

pub mod logging;
pub mod metrics;

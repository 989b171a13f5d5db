//! Health-aware JSON-RPC endpoint gateway.
//!
//! Routes JSON-RPC calls for each chain to one of several interchangeable
//! upstream endpoints, scoring every endpoint by the traffic it serves and
//! failing over when its score drops. Scores can be shared between gateway
//! instances through a store with optimistic concurrency.

pub mod blockchain;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod registry;
pub mod sync;

pub use config::schema::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::GatewayRegistry;

//! Upstream JSON-RPC plumbing.
//!
//! # Data Flow
//! ```text
//! Endpoint URL (config)
//!     → types.rs (endpoint identity, provider name, chain id)
//!     → client.rs (alloy HTTP provider with per-call timeout)
//!     → transport.rs (RpcTransport seam used by the health trackers)
//! ```
//!
//! # Design Decisions
//! - The gateway is agnostic to RPC method semantics; params and results are raw JSON
//! - Every outbound call has a deadline; a timeout is reported as a failed call
//! - Transports are trait objects so tests can script endpoint behaviour

pub mod client;
pub mod transport;
pub mod types;

pub use client::HttpTransport;
pub use transport::{RpcError, RpcTransport};
pub use types::{ChainId, EndpointIdentity};

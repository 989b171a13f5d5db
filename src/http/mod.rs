//! HTTP front door.
//!
//! # Data Flow
//! ```text
//! POST /rpc/{chain_id}
//!     → server.rs (Axum setup, timeout, tracing)
//!     → jsonrpc.rs (parse single or batch envelope)
//!     → registry perform(chain, method, params)
//!     → jsonrpc.rs (result or mapped error)
//!     → Send to client
//!
//! GET /health, GET /status
//!     → registry snapshots
//! ```

pub mod jsonrpc;
pub mod server;

pub use server::{AppState, HttpServer};

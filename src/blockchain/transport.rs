//! Transport seam between the health trackers and an upstream endpoint.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by a single upstream call.
///
/// These are passed through to the gateway caller unchanged after scoring.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Connection, HTTP or decoding failure.
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a JSON-RPC error object.
    #[error("RPC error response {code}: {message}")]
    ErrorResponse { code: i64, message: String },

    /// The call did not complete within the configured deadline.
    #[error("RPC timeout after {0:?}")]
    Timeout(Duration),

    /// The endpoint URL could not be parsed.
    #[error("Invalid RPC URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A request/response channel to one upstream endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Issue one JSON-RPC call and return its `result` member.
    async fn request(&self, method: &str, params: &Value) -> Result<Value, RpcError>;
}

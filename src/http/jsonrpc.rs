//! JSON-RPC 2.0 envelope handling.
//!
//! # Responsibilities
//! - Parse single and batch requests
//! - Map gateway errors to JSON-RPC error objects and HTTP statuses
//!
//! # Error Codes
//! - `-32700` parse error, `-32600` invalid request
//! - `-32000` upstream transport failure
//! - `-32001` no healthy endpoints, `-32002` sticky endpoint unhealthy
//! - `-32003` upstream timeout, `-32004` unknown chain
//! - upstream error responses keep their own code and message

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blockchain::RpcError;
use crate::error::GatewayError;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const INTERNAL_ERROR: i64 = -32603;
pub const UPSTREAM_ERROR: i64 = -32000;
pub const NO_HEALTHY_ENDPOINTS: i64 = -32001;
pub const STICKY_ENDPOINT_UNHEALTHY: i64 = -32002;
pub const UPSTREAM_TIMEOUT: i64 = -32003;
pub const UNKNOWN_CHAIN: i64 = -32004;

/// One inbound call.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Params to forward upstream; missing params become an empty array.
    pub fn forwarded_params(&self) -> Value {
        match &self.params {
            Value::Null => Value::Array(Vec::new()),
            other => other.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// One outbound response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcErrorObject {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn from_gateway_error(id: Value, err: &GatewayError) -> Self {
        match err {
            GatewayError::Rpc(RpcError::ErrorResponse { code, message }) => {
                Self::failure(id, *code, message.clone())
            }
            other => Self::failure(id, error_code(other), other.to_string()),
        }
    }
}

/// JSON-RPC error code for a gateway error.
pub fn error_code(err: &GatewayError) -> i64 {
    match err {
        GatewayError::NoHealthyEndpoints { .. } => NO_HEALTHY_ENDPOINTS,
        GatewayError::StickyEndpointUnhealthy { .. } => STICKY_ENDPOINT_UNHEALTHY,
        GatewayError::UnknownGroup(_) => UNKNOWN_CHAIN,
        GatewayError::EmptyGroup(_) => INTERNAL_ERROR,
        GatewayError::Rpc(RpcError::ErrorResponse { code, .. }) => *code,
        GatewayError::Rpc(RpcError::Timeout(_)) => UPSTREAM_TIMEOUT,
        GatewayError::Rpc(_) => UPSTREAM_ERROR,
    }
}

/// HTTP status for a single-call failure.
pub fn http_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::NoHealthyEndpoints { .. } | GatewayError::StickyEndpointUnhealthy { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        GatewayError::UnknownGroup(_) => StatusCode::NOT_FOUND,
        GatewayError::EmptyGroup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        // The upstream answered; the error belongs in the body.
        GatewayError::Rpc(RpcError::ErrorResponse { .. }) => StatusCode::OK,
        GatewayError::Rpc(RpcError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Rpc(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Parsed request body.
#[derive(Debug)]
pub enum Envelope {
    Single(JsonRpcRequest),
    Batch(Vec<Result<JsonRpcRequest, JsonRpcResponse>>),
}

/// Parse a request body. A malformed body yields the error response to send.
pub fn parse_envelope(body: &[u8]) -> Result<Envelope, JsonRpcResponse> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| JsonRpcResponse::failure(Value::Null, PARSE_ERROR, format!("Parse error: {e}")))?;

    match value {
        Value::Array(items) if items.is_empty() => Err(JsonRpcResponse::failure(
            Value::Null,
            INVALID_REQUEST,
            "Empty batch",
        )),
        Value::Array(items) => Ok(Envelope::Batch(items.into_iter().map(parse_request).collect())),
        single => parse_request(single).map(Envelope::Single),
    }
}

fn parse_request(value: Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| JsonRpcResponse::failure(id, INVALID_REQUEST, format!("Invalid request: {e}")))
}

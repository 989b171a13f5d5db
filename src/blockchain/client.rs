//! HTTP JSON-RPC transport backed by an alloy provider.
//!
//! # Responsibilities
//! - Connect to one JSON-RPC endpoint over HTTP
//! - Forward raw method/params pairs without interpreting them
//! - Enforce the per-call timeout

use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::{RpcError as AlloyRpcError, TransportErrorKind};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::blockchain::transport::{RpcError, RpcTransport};

/// JSON-RPC transport for a single HTTP endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    url: Url,
    provider: Arc<dyn Provider + Send + Sync>,
    timeout_duration: Duration,
}

impl HttpTransport {
    /// Create a transport for `url`. No network traffic happens here.
    pub fn new(url: &str, timeout_duration: Duration) -> Result<Self, RpcError> {
        let parsed: Url = url.parse().map_err(|e: url::ParseError| RpcError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let provider = ProviderBuilder::new().connect_http(parsed.clone());

        Ok(Self {
            url: parsed,
            provider: Arc::new(provider) as Arc<dyn Provider + Send + Sync>,
            timeout_duration,
        })
    }

    /// The endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        let raw_params = serde_json::value::to_raw_value(params)
            .map_err(|e| RpcError::Transport(format!("Invalid params: {}", e)))?;
        let fut = self
            .provider
            .raw_request_dyn(method.to_string().into(), &raw_params);

        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(raw)) => serde_json::from_str(raw.get())
                .map_err(|e| RpcError::Transport(format!("Invalid result payload: {}", e))),
            Ok(Err(e)) => Err(map_alloy_error(e)),
            Err(_) => Err(RpcError::Timeout(self.timeout_duration)),
        }
    }
}

fn map_alloy_error(err: AlloyRpcError<TransportErrorKind>) -> RpcError {
    match err {
        AlloyRpcError::ErrorResp(payload) => RpcError::ErrorResponse {
            code: payload.code,
            message: payload.message.to_string(),
        },
        other => RpcError::Transport(other.to_string()),
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url.as_str())
            .field("timeout", &self.timeout_duration)
            .finish()
    }
}

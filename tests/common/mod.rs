//! Shared utilities for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use rpc_gateway::blockchain::{ChainId, EndpointIdentity, RpcError, RpcTransport};
use rpc_gateway::config::{HealthScoringConfig, RoutingConfig};
use rpc_gateway::health::EndpointHealthTracker;
use rpc_gateway::load_balancer::{EndpointSlot, MultiEndpointRouter};
use rpc_gateway::{GatewayRegistry, HttpServer, Shutdown};

/// Transport replaying queued outcomes, then a default one.
pub struct ScriptedTransport {
    label: String,
    script: Mutex<VecDeque<Result<Value, RpcError>>>,
    fail_by_default: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    /// Succeeds with its label.
    pub fn healthy(label: &str) -> Arc<Self> {
        Self::build(label, Vec::new(), false, None)
    }

    /// Always fails with a transport error.
    pub fn failing(label: &str) -> Arc<Self> {
        Self::build(label, Vec::new(), true, None)
    }

    /// Plays `script` first, then succeeds.
    pub fn scripted(label: &str, script: Vec<Result<Value, RpcError>>) -> Arc<Self> {
        Self::build(label, script, false, None)
    }

    /// Succeeds after `delay`.
    pub fn slow(label: &str, delay: Duration) -> Arc<Self> {
        Self::build(label, Vec::new(), false, Some(delay))
    }

    fn build(
        label: &str,
        script: Vec<Result<Value, RpcError>>,
        fail_by_default: bool,
        delay: Option<Duration>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            script: Mutex::new(script.into()),
            fail_by_default,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn request(&self, _method: &str, _params: &Value) -> Result<Value, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(outcome) => outcome,
            None if self.fail_by_default => Err(RpcError::Transport(format!("{} is down", self.label))),
            None => Ok(json!(self.label)),
        }
    }
}

pub fn transport_failure() -> Result<Value, RpcError> {
    Err(RpcError::Transport("connection reset".into()))
}

/// Tracker over `transport` with `config`.
pub fn tracker(
    chain: u64,
    url: &str,
    transport: Arc<ScriptedTransport>,
    config: HealthScoringConfig,
) -> Arc<EndpointHealthTracker> {
    Arc::new(EndpointHealthTracker::new(
        ChainId(chain),
        EndpointIdentity::new(url),
        transport,
        Arc::new(config),
    ))
}

/// Router for chain 1 over `(url, transport, weight)` in precedence order.
pub fn router(
    endpoints: Vec<(&str, Arc<ScriptedTransport>, Option<f64>)>,
    config: HealthScoringConfig,
) -> MultiEndpointRouter {
    router_with(endpoints, config, RoutingConfig::default())
}

/// Like [`router`], with explicit session and sampling settings.
pub fn router_with(
    endpoints: Vec<(&str, Arc<ScriptedTransport>, Option<f64>)>,
    config: HealthScoringConfig,
    routing: RoutingConfig,
) -> MultiEndpointRouter {
    let slots = endpoints
        .into_iter()
        .enumerate()
        .map(|(index, (url, transport, weight))| EndpointSlot {
            tracker: tracker(1, url, transport, config.clone()),
            precedence: index as u32,
            weight,
        })
        .collect();
    MultiEndpointRouter::with_routing(ChainId(1), slots, false, routing).unwrap()
}

/// How a mock JSON-RPC backend answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MockMode {
    Ok = 0,
    HttpError = 1,
    RpcError = 2,
}

/// A mock JSON-RPC endpoint answering with its label.
pub struct MockRpc {
    pub label: String,
    mode: AtomicU8,
    calls: AtomicUsize,
}

impl MockRpc {
    pub fn set_mode(&self, mode: MockMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn mock_rpc_handler(State(mock): State<Arc<MockRpc>>, Json(request): Json<Value>) -> impl IntoResponse {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    match mock.mode.load(Ordering::SeqCst) {
        1 => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!("boom"))),
        2 => (
            StatusCode::OK,
            Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": 3, "message": "execution reverted" }
            })),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({ "jsonrpc": "2.0", "id": id, "result": mock.label })),
        ),
    }
}

/// Start a mock JSON-RPC backend on an ephemeral port.
pub async fn start_mock_rpc(label: &str) -> (String, Arc<MockRpc>) {
    let mock = Arc::new(MockRpc {
        label: label.to_string(),
        mode: AtomicU8::new(MockMode::Ok as u8),
        calls: AtomicUsize::new(0),
    });
    let app = Router::new()
        .route("/", post(mock_rpc_handler))
        .with_state(Arc::clone(&mock));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/"), mock)
}

/// Start the gateway HTTP server on an ephemeral port.
pub async fn start_gateway(registry: GatewayRegistry) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(&Default::default(), Arc::new(registry));
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });
    (addr, shutdown)
}

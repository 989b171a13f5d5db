//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request timeout)
//! - Dispatch JSON-RPC calls to the endpoint group registry
//! - Pin calls carrying an `x-session-id` header to one endpoint
//! - Serve health and status snapshots

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::blockchain::ChainId;
use crate::config::ListenerConfig;
use crate::health::HealthState;
use crate::http::jsonrpc::{http_status, parse_envelope, Envelope, JsonRpcRequest, JsonRpcResponse};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::GatewayRegistry;

/// Header naming the session a call belongs to.
pub const SESSION_HEADER: &str = "x-session-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<GatewayRegistry>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ListenerConfig, registry: Arc<GatewayRegistry>) -> Self {
        let state = AppState { registry };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/rpc/{chain_id}", post(rpc_handler))
            .route("/session/{chain_id}", post(session_handler))
            .route("/health", get(health_handler))
            .route("/status", get(status_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The configured router, for serving on a custom listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until shutdown is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// JSON-RPC entry point for one chain.
async fn rpc_handler(
    State(state): State<AppState>,
    Path(chain_id): Path<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let chain = ChainId(chain_id);
    let group = chain.to_string();
    let session = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    let envelope = match parse_envelope(&body) {
        Ok(envelope) => envelope,
        Err(response) => {
            tracing::debug!(chain = %chain, "Rejected malformed JSON-RPC body");
            metrics::record_request(&group, StatusCode::BAD_REQUEST.as_u16());
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    match envelope {
        Envelope::Single(request) => {
            let (status, response) = dispatch(&state, chain, session, request).await;
            metrics::record_request(&group, status.as_u16());
            (status, Json(response)).into_response()
        }
        Envelope::Batch(items) => {
            let mut responses = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Ok(request) => responses.push(dispatch(&state, chain, session, request).await.1),
                    Err(response) => responses.push(response),
                }
            }
            metrics::record_request(&group, StatusCode::OK.as_u16());
            (StatusCode::OK, Json(responses)).into_response()
        }
    }
}

async fn dispatch(
    state: &AppState,
    chain: ChainId,
    session: Option<&str>,
    request: JsonRpcRequest,
) -> (StatusCode, JsonRpcResponse) {
    let params = request.forwarded_params();
    match state
        .registry
        .perform_in_session(chain, session, &request.method, params)
        .await
    {
        Ok(result) => (StatusCode::OK, JsonRpcResponse::success(request.id, result)),
        Err(e) => {
            tracing::debug!(chain = %chain, method = %request.method, error = %e, "JSON-RPC call failed");
            (http_status(&e), JsonRpcResponse::from_gateway_error(request.id, &e))
        }
    }
}

/// Issue a session id for one chain.
async fn session_handler(State(state): State<AppState>, Path(chain_id): Path<u64>) -> Response {
    let chain = ChainId(chain_id);
    match state.registry.router(chain) {
        Some(router) => Json(json!({ "session_id": router.create_session_id() })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no endpoint group for chain {chain}") })),
        )
            .into_response(),
    }
}

/// Liveness plus a coarse view of group availability.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let groups = state.registry.status();
    let unavailable: Vec<ChainId> = groups
        .iter()
        .filter(|g| g.endpoints.iter().all(|e| e.state != HealthState::Healthy))
        .map(|g| g.chain_id)
        .collect();

    Json(json!({
        "status": if unavailable.is_empty() { "ok" } else { "degraded" },
        "groups": groups.len(),
        "unavailable_groups": unavailable,
    }))
}

/// Per-endpoint health of every group.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "groups": state.registry.status() }))
}

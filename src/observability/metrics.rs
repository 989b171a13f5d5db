//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rpc_gateway_calls_total` (counter): upstream calls by group, endpoint, method, outcome
//! - `rpc_gateway_call_duration_seconds` (histogram): upstream call latency
//! - `rpc_gateway_endpoint_health` (gauge): 1=healthy, 0=recovering
//! - `rpc_gateway_endpoint_score` (gauge): current health score
//! - `rpc_gateway_probes_total` (counter): recovery probes launched
//! - `rpc_gateway_latency_evaluations_total` (counter): shadow calls mirrored to healthy endpoints
//! - `rpc_gateway_sync_total` (counter): shared-store syncs by outcome
//! - `rpc_gateway_requests_total` (counter): inbound JSON-RPC requests by group, status

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::blockchain::ChainId;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(chain: ChainId, endpoint: &str, method: &str, outcome: &'static str, latency: Duration) {
    ::metrics::counter!(
        "rpc_gateway_calls_total",
        "group" => chain.to_string(),
        "endpoint" => endpoint.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!(
        "rpc_gateway_call_duration_seconds",
        "group" => chain.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(latency.as_secs_f64());
}

pub fn record_endpoint_health(chain: ChainId, endpoint: &str, healthy: bool, score: f64) {
    ::metrics::gauge!(
        "rpc_gateway_endpoint_health",
        "group" => chain.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
    ::metrics::gauge!(
        "rpc_gateway_endpoint_score",
        "group" => chain.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .set(score);
}

pub fn record_probe(chain: ChainId, endpoint: &str) {
    ::metrics::counter!(
        "rpc_gateway_probes_total",
        "group" => chain.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

pub fn record_sync(outcome: &'static str) {
    ::metrics::counter!("rpc_gateway_sync_total", "outcome" => outcome).increment(1);
}

pub fn record_request(group: &str, status: u16) {
    ::metrics::counter!(
        "rpc_gateway_requests_total",
        "group" => group.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_latency_evaluation(chain: ChainId, endpoint: &str, method: &str) {
    ::metrics::counter!(
        "rpc_gateway_latency_evaluations_total",
        "group" => chain.to_string(),
        "endpoint" => endpoint.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

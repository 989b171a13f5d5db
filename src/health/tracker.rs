//! Passive health tracking for one upstream endpoint.
//!
//! # Responsibilities
//! - Gate every outbound call to the endpoint
//! - Record latency and outcome of each call
//! - Score the endpoint and flip its classification
//! - Probe the endpoint in the background while it is recovering
//! - Mirror sampled calls to measure latency while it is healthy
//!
//! # Design Decisions
//! - Bookkeeping is serialized per endpoint; the network call itself is not
//! - Timeouts are failures, and so is a call dropped before it completes
//! - Each call claims its own idle gap; overlapping calls never share one
//! - The caller always receives the call's own result, scoring is a side effect

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::blockchain::{ChainId, EndpointIdentity, RpcError, RpcTransport};
use crate::config::HealthScoringConfig;
use crate::health::state::{Evaluation, HealthState, ScoreCard};
use crate::observability::metrics;
use crate::sync::record::{now_millis, LatencySample};

/// Cheap liveness query used for recovery probes.
pub const PROBE_METHOD: &str = "eth_blockNumber";

/// Point-in-time view of a tracker, for the synchronizer.
#[derive(Debug, Clone)]
pub struct SyncSnapshot {
    /// Score change since the last successful merge.
    pub delta: f64,
    /// Current local score.
    pub score: f64,
    pub latest_sample: Option<LatencySample>,
}

/// Point-in-time view of a tracker, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub url: String,
    pub provider: String,
    pub state: HealthState,
    pub score: f64,
}

/// Health tracker wrapping one upstream endpoint.
pub struct EndpointHealthTracker {
    chain: ChainId,
    identity: EndpointIdentity,
    transport: Arc<dyn RpcTransport>,
    config: Arc<HealthScoringConfig>,
    card: Mutex<ScoreCard>,
    /// Mirror of the card's classification for lock-free reads.
    state: AtomicU8,
    probing: AtomicBool,
    evaluating_latency: AtomicBool,
    last_latency_evaluation: Mutex<Option<Instant>>,
}

impl EndpointHealthTracker {
    pub fn new(
        chain: ChainId,
        identity: EndpointIdentity,
        transport: Arc<dyn RpcTransport>,
        config: Arc<HealthScoringConfig>,
    ) -> Self {
        Self {
            chain,
            identity,
            transport,
            config,
            card: Mutex::new(ScoreCard::new()),
            state: AtomicU8::new(HealthState::Healthy as u8),
            probing: AtomicBool::new(false),
            evaluating_latency: AtomicBool::new(false),
            last_latency_evaluation: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &EndpointIdentity {
        &self.identity
    }

    pub fn url(&self) -> &str {
        self.identity.url()
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == HealthState::Healthy
    }

    pub fn score(&self) -> f64 {
        self.card.lock().score()
    }

    /// True once the endpoint has been idle longer than the recovery wait period.
    pub fn has_waited_long_enough_for_probe(&self) -> bool {
        match self.card.lock().perf().last_call_at {
            Some(last) => last.elapsed() > self.config.recover_evaluation_wait_period(),
            None => true,
        }
    }

    /// Whether a background probe is currently in flight.
    pub fn is_probing(&self) -> bool {
        self.probing.load(Ordering::Acquire)
    }

    /// Call `method` on the endpoint through the scoring path.
    pub async fn execute(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        self.execute_with(method, self.transport.request(method, params))
            .await
    }

    /// Run an arbitrary call future through the scoring path.
    ///
    /// Dropping the returned future before `call` resolves scores the call as
    /// a failure.
    pub async fn execute_with<T, F>(&self, method: &str, call: F) -> Result<T, RpcError>
    where
        F: Future<Output = Result<T, RpcError>>,
    {
        let start = Instant::now();
        let waited = self.card.lock().record_before_call(start);
        let pending = PendingCall {
            tracker: self,
            method,
            start,
            waited,
            settled: false,
        };

        let result = call.await;

        let (latency, evaluation) = pending.settle(result.is_ok());
        match &result {
            Err(e) => {
                tracing::debug!(endpoint = %self.url(), method, error = %e, score = evaluation.score, "Upstream call failed");
            }
            Ok(_) => {
                tracing::trace!(endpoint = %self.url(), method, latency_ms = latency.as_millis() as u64, score = evaluation.score, "Upstream call completed");
            }
        }
        self.report(method, latency, &evaluation);
        result
    }

    /// Record a finished or abandoned call and score it.
    fn finish_call(&self, method: &str, start: Instant, waited: Duration, succeeded: bool) -> (Duration, Evaluation) {
        let end = Instant::now();
        let latency = end.saturating_duration_since(start);
        let mut card = self.card.lock();
        card.record_after_call(start, end, waited, succeeded);
        card.record_sample(LatencySample {
            timestamp_ms: now_millis(),
            latency_ms: latency.as_millis() as u64,
            api_name: method.to_string(),
        });
        let evaluation = card.evaluate(&self.config);
        self.state.store(card.state() as u8, Ordering::Release);
        (latency, evaluation)
    }

    fn report(&self, method: &str, latency: Duration, evaluation: &Evaluation) {
        let url = self.identity.url();
        metrics::record_call(self.chain, self.identity.provider_name(), method, evaluation.verdict.as_str(), latency);
        metrics::record_endpoint_health(self.chain, self.identity.provider_name(), self.is_healthy(), evaluation.score);

        match evaluation.transition {
            Some(HealthState::Recovering) => {
                tracing::warn!(chain = %self.chain, endpoint = %url, score = evaluation.score, "Endpoint dropped to unhealthy");
            }
            Some(HealthState::Healthy) => {
                tracing::info!(chain = %self.chain, endpoint = %url, score = evaluation.score, "Endpoint recovered to healthy");
            }
            None => {}
        }
    }

    /// Fire a detached liveness probe. Returns false if one is already running
    /// or there is no runtime to spawn on.
    pub fn trigger_background_probe(self: &Arc<Self>) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(endpoint = %self.url(), "No runtime available for recovery probe");
            return false;
        };
        if self.probing.swap(true, Ordering::AcqRel) {
            return false;
        }

        let tracker = Arc::clone(self);
        handle.spawn(async move {
            tracing::debug!(endpoint = %tracker.url(), "Probing unhealthy endpoint");
            metrics::record_probe(tracker.chain, tracker.identity.provider_name());
            if let Err(e) = tracker.execute(PROBE_METHOD, &Value::Array(Vec::new())).await {
                tracing::debug!(endpoint = %tracker.url(), error = %e, "Recovery probe failed");
            }
            tracing::debug!(endpoint = %tracker.url(), score = tracker.score(), healthy = tracker.is_healthy(), "Recovery probe done");
            tracker.probing.store(false, Ordering::Release);
        });
        true
    }

    /// True once the last shadow latency evaluation is older than the wait period.
    pub fn has_waited_long_enough_for_latency_evaluation(&self) -> bool {
        match *self.last_latency_evaluation.lock() {
            Some(at) => at.elapsed() > self.config.latency_evaluation_wait_period(),
            None => true,
        }
    }

    /// Whether a shadow latency evaluation is currently in flight.
    pub fn is_evaluating_latency(&self) -> bool {
        self.evaluating_latency.load(Ordering::Acquire)
    }

    /// Mirror `method` to this endpoint in the background to measure it. The
    /// call is scored like any other. Returns false if one is already running,
    /// the last one is too recent, or there is no runtime to spawn on.
    pub fn trigger_latency_evaluation(self: &Arc<Self>, method: &str, params: Value) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        if self.evaluating_latency.swap(true, Ordering::AcqRel) {
            return false;
        }
        {
            let mut last = self.last_latency_evaluation.lock();
            if matches!(*last, Some(at) if at.elapsed() <= self.config.latency_evaluation_wait_period()) {
                self.evaluating_latency.store(false, Ordering::Release);
                return false;
            }
            *last = Some(Instant::now());
        }

        let tracker = Arc::clone(self);
        let method = method.to_string();
        handle.spawn(async move {
            metrics::record_latency_evaluation(tracker.chain, tracker.identity.provider_name(), &method);
            let start = Instant::now();
            let result = tracker.execute(&method, &params).await;
            tracing::debug!(
                endpoint = %tracker.url(),
                method = %method,
                latency_ms = start.elapsed().as_millis() as u64,
                ok = result.is_ok(),
                score = tracker.score(),
                "Shadow latency evaluation done"
            );
            tracker.evaluating_latency.store(false, Ordering::Release);
        });
        true
    }

    /// Score delta and sample to report to the shared store.
    pub fn sync_snapshot(&self) -> SyncSnapshot {
        let card = self.card.lock();
        SyncSnapshot {
            delta: card.unsynced_delta(),
            score: card.score(),
            latest_sample: card.latest_sample().cloned(),
        }
    }

    /// Adopt the score merged across instances. Classification follows on the
    /// next completed call.
    pub fn adopt_merged_score(&self, merged: f64, reported_score: f64) {
        let mut card = self.card.lock();
        card.adopt_merged_score(merged, reported_score);
        tracing::debug!(endpoint = %self.url(), merged, score = card.score(), "Adopted shared health score");
    }

    pub fn status(&self) -> EndpointStatus {
        let card = self.card.lock();
        EndpointStatus {
            url: self.identity.url().to_string(),
            provider: self.identity.provider_name().to_string(),
            state: card.state(),
            score: card.score(),
        }
    }
}

/// An outbound call that has claimed its idle gap but not been scored yet.
struct PendingCall<'a> {
    tracker: &'a EndpointHealthTracker,
    method: &'a str,
    start: Instant,
    waited: Duration,
    settled: bool,
}

impl PendingCall<'_> {
    fn settle(mut self, succeeded: bool) -> (Duration, Evaluation) {
        self.settled = true;
        self.tracker.finish_call(self.method, self.start, self.waited, succeeded)
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let (latency, evaluation) = self.tracker.finish_call(self.method, self.start, self.waited, false);
        tracing::debug!(
            endpoint = %self.tracker.url(),
            method = self.method,
            latency_ms = latency.as_millis() as u64,
            score = evaluation.score,
            "Upstream call cancelled, scored as failure"
        );
        self.tracker.report(self.method, latency, &evaluation);
    }
}

impl std::fmt::Debug for EndpointHealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointHealthTracker")
            .field("chain", &self.chain)
            .field("url", &self.identity.url())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Transport replaying queued outcomes, then succeeding.
    #[derive(Default)]
    struct Replay {
        outcomes: Mutex<VecDeque<Result<Value, RpcError>>>,
        calls: AtomicUsize,
    }

    impl Replay {
        fn with(outcomes: Vec<Result<Value, RpcError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RpcTransport for Replay {
        async fn request(&self, _method: &str, _params: &Value) -> Result<Value, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes.lock().pop_front().unwrap_or(Ok(json!("0x1")))
        }
    }

    fn fail() -> Result<Value, RpcError> {
        Err(RpcError::Transport("connection refused".into()))
    }

    fn tracker(transport: Arc<Replay>) -> Arc<EndpointHealthTracker> {
        let config = HealthScoringConfig {
            max_recover_wait_ms: None,
            ..HealthScoringConfig::default()
        };
        Arc::new(EndpointHealthTracker::new(
            ChainId(1),
            EndpointIdentity::new("http://node-a.test"),
            transport,
            Arc::new(config),
        ))
    }

    #[tokio::test]
    async fn test_error_passes_through_after_scoring() {
        let t = tracker(Replay::with(vec![Err(RpcError::ErrorResponse {
            code: -32000,
            message: "execution reverted".into(),
        })]));

        let err = t.execute("eth_call", &json!([])).await.unwrap_err();
        assert!(matches!(err, RpcError::ErrorResponse { code: -32000, .. }));
        assert_eq!(t.score(), -50.0);
        assert!(t.is_healthy());
    }

    #[tokio::test]
    async fn test_drops_to_recovering_below_fallback() {
        let t = tracker(Replay::with(vec![fail(), fail()]));
        let _ = t.execute("eth_call", &json!([])).await;
        let _ = t.execute("eth_call", &json!([])).await;
        assert_eq!(t.score(), -100.0);
        assert_eq!(t.state(), HealthState::Recovering);
    }

    #[tokio::test]
    async fn test_execute_with_times_out_as_failure() {
        let t = tracker(Replay::with(vec![]));
        let result: Result<(), RpcError> = t
            .execute_with("eth_getLogs", async { Err(RpcError::Timeout(Duration::from_secs(1))) })
            .await;
        assert!(matches!(result, Err(RpcError::Timeout(_))));
        assert_eq!(t.score(), -50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_waits_for_idle_period() {
        let transport = Replay::with(vec![fail(), fail()]);
        let t = tracker(transport.clone());
        let _ = t.execute("eth_call", &json!([])).await;
        let _ = t.execute("eth_call", &json!([])).await;
        assert!(!t.has_waited_long_enough_for_probe());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(t.has_waited_long_enough_for_probe());

        assert!(t.trigger_background_probe());
        // A second trigger while the first is in flight is ignored.
        assert!(!t.trigger_background_probe());

        while t.is_probing() {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        // -100 + 11s * 0.01/ms clamps to 0.
        assert_eq!(t.score(), 0.0);
        assert!(t.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_calls_credit_idle_gap_once() {
        let t = tracker(Replay::with(vec![fail(), fail(), fail(), fail()]));
        for _ in 0..4 {
            let _ = t.execute("eth_call", &json!([])).await;
        }
        assert_eq!(t.score(), -200.0);

        tokio::time::advance(Duration::from_secs(3)).await;
        let slow_ok = || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, RpcError>(())
        };
        let (a, b, c) = tokio::join!(
            t.execute_with("eth_call", slow_ok()),
            t.execute_with("eth_call", slow_ok()),
            t.execute_with("eth_call", slow_ok()),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());

        // 3s idle at 0.01/ms is +30, paid once.
        assert!((t.score() - -170.0).abs() < 1e-9, "score was {}", t.score());
    }

    /// Transport that never answers within a test's lifetime.
    struct Hang;

    #[async_trait]
    impl RpcTransport for Hang {
        async fn request(&self, _method: &str, _params: &Value) -> Result<Value, RpcError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!("0x1"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_scored_as_failure() {
        let t = EndpointHealthTracker::new(
            ChainId(1),
            EndpointIdentity::new("http://node-b.test"),
            Arc::new(Hang),
            Arc::new(HealthScoringConfig::default()),
        );

        let result = tokio::time::timeout(Duration::from_secs(30), t.execute("eth_getLogs", &json!([]))).await;
        assert!(result.is_err());

        assert_eq!(t.score(), -50.0);
        let sample = t.sync_snapshot().latest_sample.unwrap();
        assert_eq!(sample.api_name, "eth_getLogs");
        assert_eq!(sample.latency_ms, 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_evaluation_respects_wait_period() {
        let transport = Replay::with(vec![]);
        let t = tracker(transport.clone());

        assert!(t.trigger_latency_evaluation("eth_blockNumber", json!([])));
        assert!(!t.trigger_latency_evaluation("eth_blockNumber", json!([])));
        while t.is_evaluating_latency() {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        // Still inside the 60s wait period.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!t.has_waited_long_enough_for_latency_evaluation());
        assert!(!t.trigger_latency_evaluation("eth_blockNumber", json!([])));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(t.trigger_latency_evaluation("eth_blockNumber", json!([])));
        while t.is_evaluating_latency() {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(t.score(), 0.0);
    }

    #[tokio::test]
    async fn test_sync_snapshot_and_adopt() {
        let t = tracker(Replay::with(vec![fail()]));
        let _ = t.execute("eth_chainId", &json!([])).await;

        let snapshot = t.sync_snapshot();
        assert_eq!(snapshot.delta, -50.0);
        assert_eq!(snapshot.latest_sample.as_ref().map(|s| s.api_name.as_str()), Some("eth_chainId"));

        t.adopt_merged_score(-80.0, snapshot.score);
        assert_eq!(t.score(), -80.0);
        assert_eq!(t.sync_snapshot().delta, 0.0);
        // Classification waits for the next call.
        assert!(t.is_healthy());
    }
}

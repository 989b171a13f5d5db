//! Failover router for one endpoint group.
//!
//! # Responsibilities
//! - Route each call to exactly one healthy endpoint
//! - Honor precedence, optional weights, sticky mode and sessions
//! - Re-partition healthy / unhealthy endpoints after every call
//! - Kick off sampled recovery probes for endpoints idle long enough
//! - Mirror sampled read calls to the other healthy endpoints
//!
//! # Design Decisions
//! - Routing decisions read only process-local health state
//! - Re-partitioning runs in a drop guard, so it happens even if the call is cancelled
//! - Probes and shadow calls are detached; routing never waits on them
//! - Only read-only methods are mirrored

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::blockchain::ChainId;
use crate::config::RoutingConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::health::{EndpointHealthTracker, EndpointStatus};
use crate::load_balancer::selection::{
    sort_by_precedence, total_weight, Candidate, PrecedenceFirst, SelectionStrategy,
    WeightedRandom,
};
use crate::load_balancer::session::{new_session_id, SessionCache};

/// Read-only methods that may be mirrored to other endpoints.
pub const LATENCY_EVALUATION_METHODS: &[&str] = &[
    "eth_blockNumber",
    "eth_call",
    "eth_chainId",
    "eth_estimateGas",
    "eth_gasPrice",
    "eth_getBalance",
    "eth_getBlockByHash",
    "eth_getBlockByNumber",
    "eth_getCode",
    "eth_getLogs",
    "eth_getStorageAt",
    "eth_getTransactionByHash",
    "eth_getTransactionCount",
    "eth_getTransactionReceipt",
];

/// One endpoint of a group with its routing attributes.
#[derive(Debug, Clone)]
pub struct EndpointSlot {
    pub tracker: Arc<EndpointHealthTracker>,
    /// 0 = most preferred. Fixed for the router's lifetime.
    pub precedence: u32,
    pub weight: Option<f64>,
}

#[derive(Debug, Default)]
struct Partition {
    /// Ordered by precedence.
    healthy: Vec<Candidate>,
    unhealthy: Vec<usize>,
    weight_sum: f64,
    last_used: Option<usize>,
}

/// Routing status of a group, for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub chain_id: ChainId,
    pub sticky: bool,
    pub last_used: Option<String>,
    pub sessions: usize,
    pub endpoints: Vec<EndpointStatus>,
}

/// Health-aware router over the endpoints of one chain.
#[derive(Debug)]
pub struct MultiEndpointRouter {
    chain: ChainId,
    slots: Vec<EndpointSlot>,
    strategy: Box<dyn SelectionStrategy>,
    partition: Mutex<Partition>,
    sticky: AtomicBool,
    routing: RoutingConfig,
    sessions: Mutex<SessionCache>,
    attached_session: Mutex<Option<String>>,
}

impl MultiEndpointRouter {
    /// Build a router with default routing behavior.
    pub fn new(chain: ChainId, slots: Vec<EndpointSlot>, sticky: bool) -> GatewayResult<Self> {
        Self::with_routing(chain, slots, sticky, RoutingConfig::default())
    }

    /// Build a router. Weighted selection applies only if every slot has a weight.
    pub fn with_routing(
        chain: ChainId,
        slots: Vec<EndpointSlot>,
        sticky: bool,
        routing: RoutingConfig,
    ) -> GatewayResult<Self> {
        if slots.is_empty() {
            return Err(GatewayError::EmptyGroup(chain));
        }

        let weighted = slots.iter().all(|s| s.weight.is_some());
        let strategy: Box<dyn SelectionStrategy> = if weighted {
            Box::new(WeightedRandom)
        } else {
            Box::new(PrecedenceFirst)
        };

        let router = Self {
            chain,
            slots,
            strategy,
            partition: Mutex::new(Partition::default()),
            sticky: AtomicBool::new(sticky),
            sessions: Mutex::new(SessionCache::new(routing.session_capacity)),
            attached_session: Mutex::new(None),
            routing,
        };
        router.repartition();

        tracing::info!(
            chain = %chain,
            endpoints = router.slots.len(),
            weighted,
            sticky,
            "Endpoint group ready"
        );
        Ok(router)
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn trackers(&self) -> impl Iterator<Item = &Arc<EndpointHealthTracker>> {
        self.slots.iter().map(|s| &s.tracker)
    }

    /// Route one JSON-RPC call through the group.
    pub async fn perform(&self, method: &str, params: Value) -> GatewayResult<Value> {
        self.perform_in_session(None, method, params).await
    }

    /// Route one call, keeping `session` on the endpoint that served it before.
    /// An attached session takes the place of `session`.
    pub async fn perform_in_session(
        &self,
        session: Option<&str>,
        method: &str,
        params: Value,
    ) -> GatewayResult<Value> {
        let attached = self.attached_session_id();
        let session = attached.as_deref().or(session);

        let slot = match self.select(session) {
            Ok(slot) => slot,
            Err(e) => {
                // Probes may still bring endpoints back.
                self.repartition();
                return Err(e);
            }
        };
        let tracker = Arc::clone(&self.slots[slot].tracker);

        let _guard = RepartitionGuard { router: self };
        let result = tracker.execute(method, &params).await;
        self.evaluate_other_healthy(slot, method, &params);
        result.map_err(GatewayError::from)
    }

    fn select(&self, session: Option<&str>) -> GatewayResult<usize> {
        if let Some(id) = session {
            let pinned = self.sessions.lock().get(id);
            if let Some(slot) = pinned {
                let tracker = &self.slots[slot].tracker;
                if tracker.is_healthy() {
                    self.partition.lock().last_used = Some(slot);
                    return Ok(slot);
                }
                if !self.routing.session_fallback_when_unhealthy {
                    return Err(GatewayError::StickyEndpointUnhealthy {
                        url: tracker.url().to_string(),
                    });
                }
                tracing::debug!(chain = %self.chain, session = id, endpoint = %tracker.url(), "Session endpoint unhealthy, moving session");
            }
        }

        let slot = self.select_for_group()?;
        if let Some(id) = session {
            self.sessions.lock().insert(id, slot);
        }
        Ok(slot)
    }

    fn select_for_group(&self) -> GatewayResult<usize> {
        let mut partition = self.partition.lock();
        if partition.healthy.is_empty() {
            tracing::warn!(chain = %self.chain, "No healthy endpoints available");
            return Err(GatewayError::NoHealthyEndpoints { chain: self.chain });
        }

        if self.sticky.load(Ordering::Acquire) {
            if let Some(last) = partition.last_used {
                let tracker = &self.slots[last].tracker;
                if tracker.is_healthy() {
                    return Ok(last);
                }
                return Err(GatewayError::StickyEndpointUnhealthy {
                    url: tracker.url().to_string(),
                });
            }
        }

        let slot = self
            .strategy
            .select(&partition.healthy, partition.weight_sum)
            .ok_or(GatewayError::NoHealthyEndpoints { chain: self.chain })?;
        partition.last_used = Some(slot);
        tracing::trace!(chain = %self.chain, endpoint = %self.slots[slot].tracker.url(), "Selected endpoint");
        Ok(slot)
    }

    /// Re-classify every endpoint, probe idle unhealthy ones and rebuild the
    /// precedence-ordered healthy list.
    fn repartition(&self) {
        let mut healthy = Vec::with_capacity(self.slots.len());
        let mut unhealthy = Vec::new();

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.tracker.is_healthy() {
                healthy.push(Candidate {
                    slot: index,
                    precedence: slot.precedence,
                    weight: slot.weight.unwrap_or(0.0),
                });
            } else {
                if slot.tracker.has_waited_long_enough_for_probe()
                    && sampled(self.routing.health_check_sample_prob)
                {
                    slot.tracker.trigger_background_probe();
                }
                unhealthy.push(index);
            }
        }
        sort_by_precedence(&mut healthy);

        let mut partition = self.partition.lock();
        partition.weight_sum = total_weight(&healthy);
        partition.healthy = healthy;
        partition.unhealthy = unhealthy;
    }

    /// Mirror a served call to every other healthy endpoint, when sampled.
    fn evaluate_other_healthy(&self, served: usize, method: &str, params: &Value) {
        if !self.routing.enable_shadow_latency_evaluation
            || !LATENCY_EVALUATION_METHODS.contains(&method)
            || !sampled(self.routing.latency_evaluation_sample_prob)
        {
            return;
        }

        let mut launched = 0usize;
        for (index, slot) in self.slots.iter().enumerate() {
            if index != served
                && slot.tracker.is_healthy()
                && slot.tracker.trigger_latency_evaluation(method, params.clone())
            {
                launched += 1;
            }
        }
        if launched > 0 {
            tracing::debug!(chain = %self.chain, method, launched, "Mirrored call to other healthy endpoints");
        }
    }

    /// The endpoint a new call would go to, without calling it.
    pub fn select_preferred_endpoint(&self) -> GatewayResult<String> {
        let slot = self.select(None)?;
        Ok(self.slots[slot].tracker.url().to_string())
    }

    /// A fresh session id; pass it to [`perform_in_session`](Self::perform_in_session).
    pub fn create_session_id(&self) -> String {
        let id = new_session_id();
        tracing::debug!(chain = %self.chain, session = %id, "New session id");
        id
    }

    /// Route every later call through one new session, whatever session the
    /// call names. Returns the session id.
    pub fn force_attach_to_new_session(&self) -> String {
        let id = self.create_session_id();
        *self.attached_session.lock() = Some(id.clone());
        id
    }

    pub fn detach_session(&self) {
        *self.attached_session.lock() = None;
    }

    pub fn attached_session_id(&self) -> Option<String> {
        self.attached_session.lock().clone()
    }

    /// Number of sessions currently pinned.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Allow switching endpoints on every call.
    pub fn enable_auto_switch(&self) {
        self.sticky.store(false, Ordering::Release);
    }

    /// Pin calls to the last used endpoint.
    pub fn disable_auto_switch(&self) {
        self.sticky.store(true, Ordering::Release);
    }

    pub fn is_sticky(&self) -> bool {
        self.sticky.load(Ordering::Acquire)
    }

    /// Healthy endpoint URLs in precedence order, as of the last partitioning.
    pub fn current_healthy_urls(&self) -> Vec<String> {
        let partition = self.partition.lock();
        partition
            .healthy
            .iter()
            .map(|c| self.slots[c.slot].tracker.url().to_string())
            .collect()
    }

    /// Unhealthy endpoint URLs, as of the last partitioning.
    pub fn current_unhealthy_urls(&self) -> Vec<String> {
        let partition = self.partition.lock();
        partition
            .unhealthy
            .iter()
            .map(|&i| self.slots[i].tracker.url().to_string())
            .collect()
    }

    pub fn last_used_url(&self) -> Option<String> {
        let partition = self.partition.lock();
        partition
            .last_used
            .map(|i| self.slots[i].tracker.url().to_string())
    }

    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            chain_id: self.chain,
            sticky: self.is_sticky(),
            last_used: self.last_used_url(),
            sessions: self.session_count(),
            endpoints: self.slots.iter().map(|s| s.tracker.status()).collect(),
        }
    }
}

/// Bernoulli draw with probability `prob`; exact at 0 and 1.
fn sampled(prob: f64) -> bool {
    if prob >= 1.0 {
        true
    } else if prob <= 0.0 {
        false
    } else {
        rand::thread_rng().gen::<f64>() < prob
    }
}

/// Re-partitions the router when a call completes or is dropped.
struct RepartitionGuard<'a> {
    router: &'a MultiEndpointRouter,
}

impl Drop for RepartitionGuard<'_> {
    fn drop(&mut self) {
        self.router.repartition();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{EndpointIdentity, RpcError, RpcTransport};
    use crate::config::HealthScoringConfig;
    use async_trait::async_trait;
    use serde_json::json;

    /// Answers with its own URL, or always fails.
    #[derive(Debug)]
    struct Echo {
        url: String,
        fail: bool,
    }

    #[async_trait]
    impl RpcTransport for Echo {
        async fn request(&self, _method: &str, _params: &Value) -> Result<Value, RpcError> {
            if self.fail {
                Err(RpcError::Transport("down".into()))
            } else {
                Ok(json!(self.url))
            }
        }
    }

    fn slot(url: &str, fail: bool, precedence: u32, weight: Option<f64>) -> EndpointSlot {
        let transport = Arc::new(Echo {
            url: url.to_string(),
            fail,
        });
        EndpointSlot {
            tracker: Arc::new(EndpointHealthTracker::new(
                ChainId(1),
                EndpointIdentity::new(url),
                transport,
                Arc::new(HealthScoringConfig::default()),
            )),
            precedence,
            weight,
        }
    }

    #[test]
    fn test_empty_group_rejected() {
        let err = MultiEndpointRouter::new(ChainId(5), Vec::new(), false).unwrap_err();
        assert!(matches!(err, GatewayError::EmptyGroup(ChainId(5))));
    }

    #[tokio::test]
    async fn test_precedence_order() {
        let router = MultiEndpointRouter::new(
            ChainId(1),
            vec![
                slot("http://c.test", false, 2, None),
                slot("http://a.test", false, 0, None),
                slot("http://b.test", false, 1, None),
            ],
            false,
        )
        .unwrap();

        assert_eq!(
            router.current_healthy_urls(),
            vec!["http://a.test", "http://b.test", "http://c.test"]
        );
        for _ in 0..5 {
            let result = router.perform("eth_chainId", json!([])).await.unwrap();
            assert_eq!(result, json!("http://a.test"));
        }
        assert_eq!(router.select_preferred_endpoint().unwrap(), "http://a.test");
    }

    #[tokio::test]
    async fn test_failover_after_fallback() {
        let router = MultiEndpointRouter::new(
            ChainId(1),
            vec![
                slot("http://a.test", true, 0, None),
                slot("http://b.test", false, 1, None),
            ],
            false,
        )
        .unwrap();

        // Two failures take A from 0 to -100, below -70.
        for _ in 0..2 {
            let err = router.perform("eth_chainId", json!([])).await.unwrap_err();
            assert!(matches!(err, GatewayError::Rpc(RpcError::Transport(_))));
        }
        assert_eq!(router.current_unhealthy_urls(), vec!["http://a.test"]);
        assert_eq!(router.current_healthy_urls(), vec!["http://b.test"]);

        let result = router.perform("eth_chainId", json!([])).await.unwrap();
        assert_eq!(result, json!("http://b.test"));
        assert_eq!(router.last_used_url().as_deref(), Some("http://b.test"));
    }

    #[tokio::test]
    async fn test_sticky_endpoint_unhealthy() {
        let router = MultiEndpointRouter::new(
            ChainId(1),
            vec![
                slot("http://a.test", true, 0, None),
                slot("http://b.test", false, 1, None),
            ],
            false,
        )
        .unwrap();
        router.disable_auto_switch();

        let _ = router.perform("eth_chainId", json!([])).await;
        let _ = router.perform("eth_chainId", json!([])).await;

        let err = router.perform("eth_chainId", json!([])).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::StickyEndpointUnhealthy { ref url } if url == "http://a.test"
        ));

        router.enable_auto_switch();
        let result = router.perform("eth_chainId", json!([])).await.unwrap();
        assert_eq!(result, json!("http://b.test"));
    }

    #[tokio::test]
    async fn test_no_healthy_endpoints() {
        let router =
            MultiEndpointRouter::new(ChainId(7), vec![slot("http://a.test", true, 0, None)], false)
                .unwrap();
        let _ = router.perform("eth_chainId", json!([])).await;
        let _ = router.perform("eth_chainId", json!([])).await;

        let err = router.perform("eth_chainId", json!([])).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoHealthyEndpoints { chain: ChainId(7) }));
    }

    #[tokio::test]
    async fn test_weight_sum_excludes_unhealthy() {
        let router = MultiEndpointRouter::new(
            ChainId(1),
            vec![
                slot("http://a.test", true, 0, Some(1.0)),
                slot("http://b.test", false, 1, Some(3.0)),
            ],
            false,
        )
        .unwrap();
        assert_eq!(router.partition.lock().weight_sum, 4.0);

        // Drive A down; B may be drawn in between, so loop until A drops.
        for _ in 0..200 {
            if !router.slots[0].tracker.is_healthy() {
                break;
            }
            let _ = router.perform("eth_chainId", json!([])).await;
        }
        assert!(!router.slots[0].tracker.is_healthy());
        assert_eq!(router.partition.lock().weight_sum, 3.0);

        for _ in 0..20 {
            let result = router.perform("eth_chainId", json!([])).await.unwrap();
            assert_eq!(result, json!("http://b.test"));
        }
    }

    fn two_endpoints(a_fails: bool, routing: RoutingConfig) -> MultiEndpointRouter {
        MultiEndpointRouter::with_routing(
            ChainId(1),
            vec![
                slot("http://a.test", a_fails, 0, Some(1.0)),
                slot("http://b.test", false, 1, Some(1.0)),
            ],
            false,
            routing,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_session_pins_endpoint() {
        let router = two_endpoints(false, RoutingConfig::default());
        let session = router.create_session_id();

        let first = router
            .perform_in_session(Some(&session), "eth_chainId", json!([]))
            .await
            .unwrap();
        for _ in 0..30 {
            let result = router
                .perform_in_session(Some(&session), "eth_chainId", json!([]))
                .await
                .unwrap();
            assert_eq!(result, first);
        }
        assert_eq!(router.session_count(), 1);
        assert_eq!(router.status().sessions, 1);
    }

    #[tokio::test]
    async fn test_session_moves_when_pinned_endpoint_unhealthy() {
        let router = MultiEndpointRouter::new(
            ChainId(1),
            vec![
                slot("http://a.test", true, 0, None),
                slot("http://b.test", false, 1, None),
            ],
            false,
        )
        .unwrap();

        // Pinned to A by precedence; two failures take it out.
        for _ in 0..2 {
            let _ = router.perform_in_session(Some("s1"), "eth_chainId", json!([])).await;
        }
        let result = router
            .perform_in_session(Some("s1"), "eth_chainId", json!([]))
            .await
            .unwrap();
        assert_eq!(result, json!("http://b.test"));
        assert_eq!(router.sessions.lock().get("s1"), Some(1));
    }

    #[tokio::test]
    async fn test_session_without_fallback_fails() {
        let routing = RoutingConfig {
            session_fallback_when_unhealthy: false,
            ..RoutingConfig::default()
        };
        let router = MultiEndpointRouter::with_routing(
            ChainId(1),
            vec![
                slot("http://a.test", true, 0, None),
                slot("http://b.test", false, 1, None),
            ],
            false,
            routing,
        )
        .unwrap();

        for _ in 0..2 {
            let _ = router.perform_in_session(Some("s1"), "eth_chainId", json!([])).await;
        }
        let err = router
            .perform_in_session(Some("s1"), "eth_chainId", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::StickyEndpointUnhealthy { ref url } if url == "http://a.test"
        ));

        // Calls outside the session still fail over.
        let result = router.perform("eth_chainId", json!([])).await.unwrap();
        assert_eq!(result, json!("http://b.test"));
    }

    #[tokio::test]
    async fn test_attached_session_overrides_call_session() {
        let router = two_endpoints(false, RoutingConfig::default());
        let attached = router.force_attach_to_new_session();
        assert_eq!(router.attached_session_id().as_deref(), Some(attached.as_str()));

        let first = router.perform("eth_chainId", json!([])).await.unwrap();
        for i in 0..20 {
            let session = format!("other-{i}");
            let result = router
                .perform_in_session(Some(&session), "eth_chainId", json!([]))
                .await
                .unwrap();
            assert_eq!(result, first);
        }
        assert_eq!(router.session_count(), 1);

        router.detach_session();
        assert!(router.attached_session_id().is_none());
    }

    #[test]
    fn test_sampling_bounds_are_exact() {
        assert!((0..100).all(|_| sampled(1.0)));
        assert!((0..100).all(|_| !sampled(0.0)));
    }
}

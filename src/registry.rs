//! Endpoint group registry.
//!
//! Built once at startup from configuration and shared by `Arc` with the
//! HTTP front door and the sync service.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::{ChainId, EndpointIdentity, HttpTransport, RpcError, RpcTransport};
use crate::config::{EndpointConfig, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::health::EndpointHealthTracker;
use crate::load_balancer::{EndpointSlot, GroupStatus, MultiEndpointRouter};

/// One router per configured chain.
#[derive(Debug, Default)]
pub struct GatewayRegistry {
    routers: BTreeMap<ChainId, Arc<MultiEndpointRouter>>,
}

impl GatewayRegistry {
    /// Build every group with HTTP transports.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let timeout = Duration::from_secs(config.rpc.timeout_secs);
        Self::from_config_with(config, |endpoint| {
            let transport = HttpTransport::new(&endpoint.url, timeout)?;
            Ok(Arc::new(transport) as Arc<dyn RpcTransport>)
        })
    }

    /// Build every group, creating each endpoint's transport with `make_transport`.
    pub fn from_config_with<F>(config: &GatewayConfig, mut make_transport: F) -> GatewayResult<Self>
    where
        F: FnMut(&EndpointConfig) -> Result<Arc<dyn RpcTransport>, RpcError>,
    {
        let mut routers = BTreeMap::new();
        for group in &config.groups {
            let chain = ChainId(group.chain_id);
            let health = Arc::new(config.health_for(group));
            let routing = config.routing_for(group);

            let mut slots = Vec::with_capacity(group.endpoints.len());
            for (index, endpoint) in group.endpoints.iter().enumerate() {
                let transport = make_transport(endpoint)?;
                let tracker = EndpointHealthTracker::new(
                    chain,
                    EndpointIdentity::new(endpoint.url.clone()),
                    transport,
                    Arc::clone(&health),
                );
                slots.push(EndpointSlot {
                    tracker: Arc::new(tracker),
                    precedence: endpoint.precedence.unwrap_or(index as u32),
                    weight: endpoint.weight,
                });
            }

            let router = MultiEndpointRouter::with_routing(chain, slots, group.sticky, routing)?;
            routers.insert(chain, Arc::new(router));
        }
        Ok(Self { routers })
    }

    /// Register a prebuilt router, replacing any router for the same chain.
    pub fn insert(&mut self, router: MultiEndpointRouter) {
        self.routers.insert(router.chain(), Arc::new(router));
    }

    pub fn router(&self, chain: ChainId) -> Option<&Arc<MultiEndpointRouter>> {
        self.routers.get(&chain)
    }

    pub fn routers(&self) -> impl Iterator<Item = &Arc<MultiEndpointRouter>> {
        self.routers.values()
    }

    pub fn chains(&self) -> Vec<ChainId> {
        self.routers.keys().copied().collect()
    }

    /// Route a call to the group serving `chain`.
    pub async fn perform(&self, chain: ChainId, method: &str, params: Value) -> GatewayResult<Value> {
        self.perform_in_session(chain, None, method, params).await
    }

    /// Route a call within `session` to the group serving `chain`.
    pub async fn perform_in_session(
        &self,
        chain: ChainId,
        session: Option<&str>,
        method: &str,
        params: Value,
    ) -> GatewayResult<Value> {
        let router = self.router(chain).ok_or(GatewayError::UnknownGroup(chain))?;
        router.perform_in_session(session, method, params).await
    }

    /// Status of every group, ordered by chain id.
    pub fn status(&self) -> Vec<GroupStatus> {
        self.routers.values().map(|r| r.status()).collect()
    }
}

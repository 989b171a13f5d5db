//! Errors surfaced to gateway callers.

use thiserror::Error;

use crate::blockchain::{ChainId, RpcError};

/// Errors returned by [`MultiEndpointRouter::perform`](crate::load_balancer::MultiEndpointRouter::perform)
/// and the registry that fronts it.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every endpoint of the group is currently recovering.
    #[error("No healthy endpoints available for chain {chain}")]
    NoHealthyEndpoints { chain: ChainId },

    /// Sticky mode is on and the pinned endpoint became unhealthy.
    #[error("Sticky endpoint {url} is unhealthy")]
    StickyEndpointUnhealthy { url: String },

    /// No group is configured for the requested chain.
    #[error("No endpoint group configured for chain {0}")]
    UnknownGroup(ChainId),

    /// A group was constructed without endpoints.
    #[error("Endpoint group for chain {0} has no endpoints")]
    EmptyGroup(ChainId),

    /// The selected endpoint's own failure, passed through after scoring.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

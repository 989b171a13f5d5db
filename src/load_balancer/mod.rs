//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! perform(chain, session, method, params)
//!     → router.rs (group of trackers for the chain)
//!     → Select endpoint:
//!         - session.rs: endpoint pinned to the session, if healthy
//!         - sticky mode: last used endpoint, or fail
//!         - selection.rs WeightedRandom (all endpoints weighted)
//!         - selection.rs PrecedenceFirst (otherwise)
//!     → health tracker executes the call
//!     → sampled: mirror the call to the other healthy endpoints
//!     → router re-partitions healthy / unhealthy, probing sampled idle ones
//! ```
//!
//! # Design Decisions
//! - Strategy chosen once per group at construction
//! - Unhealthy endpoints excluded from selection and from the weight sum
//! - Precedence never changes at runtime

pub mod router;
pub mod selection;
pub mod session;

pub use router::{EndpointSlot, GroupStatus, MultiEndpointRouter, LATENCY_EVALUATION_METHODS};
pub use session::{new_session_id, SessionCache};
pub use selection::{Candidate, PrecedenceFirst, SelectionStrategy, WeightedRandom};

//! Cross-instance health synchronization.
//!
//! # Data Flow
//! ```text
//! service.rs (timer tick)
//!     → tracker sync snapshot (delta since last merge, score, latest sample)
//!     → synchronizer.rs (read, merge delta, conditional write)
//!     → store.rs trait:
//!         - memory.rs (process-local DashMap)
//!         - sqlite.rs (shared database file)
//!     → tracker adopts merged score
//! ```
//!
//! # Design Decisions
//! - Routing never waits on the store
//! - Store failures and conflicts degrade to "sync later"
//! - Records carry their own expiry; expired reads as absent

pub mod memory;
pub mod record;
pub mod service;
pub mod sqlite;
pub mod store;
pub mod synchronizer;

pub use memory::MemoryStateStore;
pub use record::{LatencySample, SharedHealthRecord, StateKey};
pub use service::SyncService;
pub use sqlite::SqliteStateStore;
pub use store::{HealthStateStore, StoreError};
pub use synchronizer::{HealthStateSynchronizer, SyncOutcome};

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Ctrl+C / SIGINT
//!     → shutdown.rs (broadcast)
//!     → HTTP server stops accepting, drains in-flight requests
//!     → Sync service finishes its current tick and exits
//! ```
//!
//! # Design Decisions
//! - One broadcast coordinator shared by every long-running task
//! - Tasks subscribe before they start, so no signal is missed

pub mod shutdown;

pub use shutdown::Shutdown;

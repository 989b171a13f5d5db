//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → endpoint groups built once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; routers and trackers never see changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    EndpointConfig, GatewayConfig, GroupConfig, HealthScoringConfig, ListenerConfig,
    ObservabilityConfig, RoutingConfig, RpcClientConfig, StoreBackend, SyncConfig,
};
pub use validation::{validate_config, ValidationError};

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/YAML/JSON)
//!     → loader.rs (parse, normalize)
//!     → validation.rs (semantic checks, mask rule compilation)
//!     → SystemConfig (validated, immutable)
//!     → compiled into a gateway Snapshot
//!
//! On change (file watcher or admin API):
//!     store.rs persists atomically (admin only)
//!     → watcher.rs detects change
//!     → loader.rs loads + validation.rs validates
//!     → atomic swap of the gateway Snapshot
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError, ConfigFormat};
pub use schema::{
    AdminConfig, LogFormat, MaskRule, ObservabilityConfig, PoolConfig, ProxySettings,
    RateLimitConfig, RequestRules, ResponseRules, RouteConfig, ServerConfig, SystemConfig,
    TimeoutConfig,
};
pub use store::ConfigStore;
pub use validation::{validate_config, ValidationError};

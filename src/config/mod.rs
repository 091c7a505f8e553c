//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML/JSON/TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc with the dispatcher
//!     → serialized verbatim to every worker, which validates it again
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError, ConfigFormat};
pub use schema::{
    BalancingStrategy, CacheConfig, HeaderConfig, ObservabilityConfig, ProxyConfig, RateLimitConfig,
    RuleConfig, ServerConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};

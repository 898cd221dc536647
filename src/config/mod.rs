//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → environment overlay (secrets, site URL, APP_ENV)
//!     → validation.rs (semantic checks)
//!     → IntakeConfig (validated, immutable)
//!     → handed to each service at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; services are built from it once
//! - All fields have defaults to allow minimal configs
//! - Credentials come from the environment and are never serialized

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    CrmConfig, Environment, HashingConfig, IntakeConfig, ObservabilityConfig, RateLimitConfig,
    RetryConfig, SecurityConfig, ServerConfig, SiteConfig, StoreBackend, StoreConfig, SyncMode,
};

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the intake service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the lead intake service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IntakeConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,

    /// Public site identity used for origin checks.
    pub site: SiteConfig,

    /// Client IP trust model.
    pub security: SecurityConfig,

    /// Per-purpose salts for identity hashing.
    pub hashing: HashingConfig,

    /// Submission rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Primary lead store.
    pub store: StoreConfig,

    /// External CRM synchronization.
    pub crm: CrmConfig,

    /// Retry policy for CRM writes.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_size: 64 * 1024,
        }
    }
}

/// Deployment environment. Controls which proxy headers are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Parse the conventional `APP_ENV` spellings.
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Environment::Production),
            "development" | "dev" => Some(Environment::Development),
            "test" => Some(Environment::Test),
            _ => None,
        }
    }
}

/// Site identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Canonical public URL of the site serving the form.
    pub site_url: String,

    /// Deployment environment.
    pub environment: Environment,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_url: "http://localhost:3000".to_string(),
            environment: Environment::Development,
        }
    }
}

/// Client IP extraction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Headers set by the trusted edge proxy, in priority order.
    /// The only headers honored in production.
    pub trusted_ip_headers: Vec<String>,

    /// Additional conventional proxy headers honored outside production.
    pub development_ip_headers: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trusted_ip_headers: vec![
                "x-vercel-forwarded-for".to_string(),
                "cf-connecting-ip".to_string(),
            ],
            development_ip_headers: vec![
                "x-forwarded-for".to_string(),
                "x-real-ip".to_string(),
                "x-client-ip".to_string(),
            ],
        }
    }
}

/// Static salts, one per hashing purpose.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HashingConfig {
    pub email_salt: String,
    pub ip_salt: String,
    pub span_salt: String,
    pub idempotency_salt: String,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            email_salt: "lead-intake:email:v1".to_string(),
            ip_salt: "lead-intake:ip:v1".to_string(),
            span_salt: "lead-intake:span:v1".to_string(),
            idempotency_salt: "lead-intake:idempotency:v1".to_string(),
        }
    }
}

impl std::fmt::Debug for HashingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashingConfig").finish_non_exhaustive()
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admitted submissions per identifier per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Redis REST endpoint for the distributed limiter.
    pub redis_rest_url: Option<String>,

    /// Bearer token for the Redis REST endpoint.
    #[serde(skip_serializing)]
    pub redis_rest_token: Option<String>,

    /// Key namespace in the shared Redis.
    pub key_prefix: String,

    /// Timeout for a single limiter call in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window_secs: 3600,
            redis_rest_url: None,
            redis_rest_token: None,
            key_prefix: "lead-intake:ratelimit".to_string(),
            request_timeout_secs: 5,
        }
    }
}

/// Which lead store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map. Development and tests only.
    #[default]
    Memory,
    /// PostgREST-compatible HTTP API.
    Rest,
}

/// Primary store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Base URL of the REST API (e.g., "https://project.supabase.co").
    pub url: Option<String>,

    /// Service key sent as `apikey` and bearer token.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Table holding lead rows.
    pub table: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            api_key: None,
            table: "leads".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Whether CRM sync runs before the response or detached from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Inline,
    #[default]
    Background,
}

/// CRM configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrmConfig {
    /// Enable CRM synchronization.
    pub enabled: bool,

    /// CRM API base URL.
    pub base_url: String,

    /// Private app access token.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    pub sync_mode: SyncMode,

    /// Inline mode only: give up on the sync after this many milliseconds and
    /// leave the lead `needs_sync`. Must stay below `server.request_timeout_secs`.
    pub inline_timeout_ms: u64,

    /// Age in seconds after which an unattempted `pending` lead is reconciled.
    pub stale_pending_secs: u64,

    /// How long shutdown waits for background syncs, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.hubapi.com".to_string(),
            access_token: None,
            timeout_secs: 10,
            sync_mode: SyncMode::Background,
            inline_timeout_ms: 20_000,
            stale_pending_secs: 900,
            drain_timeout_secs: 30,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            jitter: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

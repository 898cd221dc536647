//! Dual-identifier submission rate limiting.
//!
//! # Data Flow
//! ```text
//! check_rate_limit(email, ip)
//!     → identity hasher (email hash, IP hash)
//!     → email identifier charged first
//!     → IP identifier charged only if the email was admitted
//!     → backend: distributed.rs when credentials exist, else memory.rs
//! ```
//!
//! # Design Decisions
//! - Fail closed: blank input, hashing errors and backend errors all deny
//! - Backend chosen once per process; a failed build is not retried per request
//! - Denial is reported, not enforced: the caller still stores the lead

pub mod distributed;
pub mod identifier;
pub mod memory;

use std::sync::{Arc, OnceLock};
use std::time::Duration as StdDuration;

use thiserror::Error;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::identity::{HashError, IdentityHasher};
use crate::observability::metrics;

pub use distributed::{DistributedLimiter, LimitDecision, RedisRestLimiter};
pub use identifier::{IdentifierKind, RateLimitIdentifier};
pub use memory::{MemoryWindowLimiter, WindowEntry};

/// Errors from a rate-limit check. All of them deny the request.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("cannot derive identifier: {0}")]
    Hash(#[from] HashError),

    #[error("limiter misconfigured: {0}")]
    Config(String),

    #[error("limiter transport error: {0}")]
    Transport(String),

    #[error("limiter response decode error: {0}")]
    Decode(String),

    #[error("limiter backend error: {0}")]
    Backend(String),
}

/// Resolved backend. Absence of a value in the `OnceLock` means not yet resolved.
enum Backend {
    Distributed(Arc<dyn DistributedLimiter>),
    /// No credentials, or the distributed limiter could not be built.
    Unavailable,
}

/// Admission control for submissions.
pub struct RateLimiter {
    config: RateLimitConfig,
    hasher: IdentityHasher,
    clock: Arc<dyn Clock>,
    injected: Option<Arc<dyn DistributedLimiter>>,
    backend: OnceLock<Backend>,
    memory: MemoryWindowLimiter,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, hasher: IdentityHasher, clock: Arc<dyn Clock>) -> Self {
        let memory = MemoryWindowLimiter::new(
            config.max_requests,
            chrono::Duration::seconds(
                i64::try_from(config.window_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::from(u32::MAX)),
            ),
            clock.clone(),
        );
        Self {
            config,
            hasher,
            clock,
            injected: None,
            backend: OnceLock::new(),
            memory,
        }
    }

    /// Use `limiter` instead of reading credentials from the configuration.
    pub fn with_distributed(
        config: RateLimitConfig,
        hasher: IdentityHasher,
        clock: Arc<dyn Clock>,
        limiter: Arc<dyn DistributedLimiter>,
    ) -> Self {
        let mut this = Self::new(config, hasher, clock);
        this.injected = Some(limiter);
        this
    }

    fn backend(&self) -> &Backend {
        self.backend.get_or_init(|| {
            if let Some(limiter) = &self.injected {
                return Backend::Distributed(limiter.clone());
            }
            let (Some(url), Some(token)) = (
                self.config.redis_rest_url.as_deref(),
                self.config.redis_rest_token.as_deref(),
            ) else {
                tracing::info!("No distributed limiter credentials; using in-memory windows");
                return Backend::Unavailable;
            };
            match RedisRestLimiter::new(
                url,
                token,
                &self.config.key_prefix,
                self.config.max_requests,
                StdDuration::from_secs(self.config.window_secs),
                StdDuration::from_secs(self.config.request_timeout_secs),
                self.clock.clone(),
            ) {
                Ok(limiter) => {
                    tracing::info!("Distributed rate limiter configured");
                    Backend::Distributed(Arc::new(limiter))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Distributed limiter unavailable; using in-memory windows");
                    Backend::Unavailable
                }
            }
        })
    }

    /// `"distributed"` or `"memory"`. Resolves the backend if needed.
    pub fn backend_kind(&self) -> &'static str {
        match self.backend() {
            Backend::Distributed(_) => "distributed",
            Backend::Unavailable => "memory",
        }
    }

    pub fn memory_windows(&self) -> &MemoryWindowLimiter {
        &self.memory
    }

    /// Whether a submission from `email` at `client_ip` is admitted.
    pub async fn check_rate_limit(&self, email: &str, client_ip: &str) -> bool {
        match self.try_check(email, client_ip).await {
            Ok(Some(kind)) => {
                tracing::warn!(identifier = kind.as_str(), "Rate limit exceeded");
                metrics::record_rate_limited(kind.as_str());
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Rate limit check failed; denying");
                false
            }
        }
    }

    /// The identifier kind that was denied, if any.
    async fn try_check(
        &self,
        email: &str,
        client_ip: &str,
    ) -> Result<Option<IdentifierKind>, RateLimitError> {
        let email_id = RateLimitIdentifier::email(self.hasher.hash_email(email)?);
        let ip_id = RateLimitIdentifier::ip(self.hasher.hash_ip(client_ip)?);

        for id in [email_id, ip_id] {
            if !self.admit(&id).await? {
                return Ok(Some(id.kind()));
            }
        }
        Ok(None)
    }

    async fn admit(&self, id: &RateLimitIdentifier) -> Result<bool, RateLimitError> {
        match self.backend() {
            Backend::Distributed(limiter) => Ok(limiter.limit(id).await?.success),
            Backend::Unavailable => Ok(self.memory.check(id)),
        }
    }

    /// Forget the resolved backend and every in-memory window.
    pub fn reset(&mut self) {
        self.backend = OnceLock::new();
        self.memory.clear();
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.config.max_requests)
            .field("window_secs", &self.config.window_secs)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! requirements. All errors are reported at once rather than stopping at the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{IntakeConfig, StoreBackend, SyncMode};
use crate::resilience::calculate_backoff;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.bind_address is not a socket address: {0}")]
    InvalidBindAddress(String),

    #[error("site.site_url is not an absolute URL with a host: {0}")]
    InvalidSiteUrl(String),

    #[error("rate_limit.max_requests must be greater than zero")]
    ZeroRateLimit,

    #[error("rate_limit.window_secs must be greater than zero")]
    ZeroWindow,

    #[error("retries.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("retries.base_delay_ms ({base}) exceeds retries.max_delay_ms ({max})")]
    DelayBounds { base: u64, max: u64 },

    #[error("store.url is required for the rest backend")]
    MissingStoreUrl,

    #[error("crm.access_token is required when crm.enabled is true")]
    MissingCrmToken,

    #[error("crm.base_url is not a valid URL: {0}")]
    InvalidCrmUrl(String),

    #[error("crm.inline_timeout_ms ({inline_ms}) must be below server.request_timeout_secs ({request_ms} ms)")]
    InlineTimeoutTooLong { inline_ms: u64, request_ms: u64 },

    #[error("inline CRM retry budget ({budget_ms} ms) reaches server.request_timeout_secs ({request_ms} ms)")]
    InlineRetryBudget { budget_ms: u64, request_ms: u64 },

    #[error("hashing salts must be non-empty and distinct per purpose")]
    WeakSalts,
}

/// Longest an inline sync can run: every attempt spends a lookup and a write
/// at the full CRM timeout, plus every backoff delay (with maximum jitter).
pub fn inline_retry_budget_ms(config: &IntakeConfig) -> u64 {
    let retries = &config.retries;
    let attempts = u64::from(retries.max_attempts.max(1));
    let per_call_ms = config.crm.timeout_secs.saturating_mul(1000);
    let calls_ms = attempts.saturating_mul(2).saturating_mul(per_call_ms);

    let delays_ms = (1..retries.max_attempts.max(1))
        .map(|attempt| {
            let delay = calculate_backoff(attempt, retries.base_delay_ms, retries.max_delay_ms);
            let ms = delay.as_millis() as u64;
            if retries.jitter {
                ms.saturating_add(ms / 10)
            } else {
                ms
            }
        })
        .fold(0u64, u64::saturating_add);

    calls_ms.saturating_add(delays_ms)
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &IntakeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }

    match Url::parse(&config.site.site_url) {
        Ok(url) if url.host_str().is_some() => {}
        _ => errors.push(ValidationError::InvalidSiteUrl(config.site.site_url.clone())),
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::ZeroRateLimit);
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::ZeroWindow);
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::ZeroAttempts);
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::DelayBounds {
            base: config.retries.base_delay_ms,
            max: config.retries.max_delay_ms,
        });
    }

    if config.store.backend == StoreBackend::Rest
        && config.store.url.as_deref().map_or(true, |u| u.trim().is_empty())
    {
        errors.push(ValidationError::MissingStoreUrl);
    }

    if config.crm.enabled {
        if config.crm.access_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            errors.push(ValidationError::MissingCrmToken);
        }
        if Url::parse(&config.crm.base_url).is_err() {
            errors.push(ValidationError::InvalidCrmUrl(config.crm.base_url.clone()));
        }

        if config.crm.sync_mode == SyncMode::Inline {
            let request_ms = config.server.request_timeout_secs.saturating_mul(1000);
            if config.crm.inline_timeout_ms >= request_ms {
                errors.push(ValidationError::InlineTimeoutTooLong {
                    inline_ms: config.crm.inline_timeout_ms,
                    request_ms,
                });
            }
            let budget_ms = inline_retry_budget_ms(config);
            if budget_ms >= request_ms {
                errors.push(ValidationError::InlineRetryBudget {
                    budget_ms,
                    request_ms,
                });
            }
        }
    }

    let salts = [
        &config.hashing.email_salt,
        &config.hashing.ip_salt,
        &config.hashing.span_salt,
        &config.hashing.idempotency_salt,
    ];
    let distinct: HashSet<&String> = salts.iter().copied().collect();
    if salts.iter().any(|s| s.is_empty()) || distinct.len() != salts.len() {
        errors.push(ValidationError::WeakSalts);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

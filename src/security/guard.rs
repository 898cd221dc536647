//! Request forgery defenses.
//!
//! # Responsibilities
//! - Origin/Referer check against the expected host (CSRF)
//! - Honeypot field detection
//! - Client IP resolution (delegated to `client_ip.rs`)

use axum::http::{header, HeaderMap};
use url::Url;

use crate::config::{Environment, SecurityConfig, SiteConfig};
use crate::error::ForgeryReason;
use crate::intake::ContactSubmission;
use crate::security::client_ip::ClientIpResolver;

/// Front-door checks run before any payload processing.
#[derive(Debug, Clone)]
pub struct RequestGuard {
    site_host: Option<String>,
    environment: Environment,
    ip_resolver: ClientIpResolver,
}

impl RequestGuard {
    pub fn new(site: &SiteConfig, security: &SecurityConfig) -> Self {
        let site_host = Url::parse(&site.site_url).ok().and_then(|u| authority(&u));
        if site_host.is_none() {
            tracing::warn!(site_url = %site.site_url, "Site URL has no host; origin checks rely on the Host header");
        }
        Self {
            site_host,
            environment: site.environment,
            ip_resolver: ClientIpResolver::new(security),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Host the request must originate from: the `Host` header when present,
    /// otherwise the configured site URL.
    fn expected_host(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .or_else(|| self.site_host.clone())
    }

    /// CSRF check with the failure reason.
    pub fn check_origin(&self, headers: &HeaderMap) -> Result<(), ForgeryReason> {
        let origin = headers.get(header::ORIGIN).map(|v| v.to_str().unwrap_or(""));
        let referer = headers.get(header::REFERER).map(|v| v.to_str().unwrap_or(""));

        if origin.is_none() && referer.is_none() {
            return Err(ForgeryReason::MissingOrigin);
        }

        let expected = self
            .expected_host(headers)
            .ok_or(ForgeryReason::UnknownHost)?;

        // Every header that is present must match.
        for value in [origin, referer].into_iter().flatten() {
            if !host_matches(value, &expected) {
                return Err(ForgeryReason::OriginMismatch);
            }
        }
        Ok(())
    }

    pub fn validate_origin(&self, headers: &HeaderMap) -> bool {
        self.check_origin(headers).is_ok()
    }

    pub fn is_honeypot_triggered(&self, submission: &ContactSubmission) -> bool {
        submission.website.as_deref().is_some_and(|v| !v.is_empty())
    }

    pub fn resolve_client_ip(&self, headers: &HeaderMap) -> String {
        self.ip_resolver.resolve(headers, self.environment)
    }
}

/// `host[:port]` of a URL, lower-cased. Default ports are omitted.
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Malformed URLs never match.
fn host_matches(value: &str, expected: &str) -> bool {
    Url::parse(value)
        .ok()
        .and_then(|u| authority(&u))
        .is_some_and(|host| host == expected)
}

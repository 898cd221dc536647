//! Client IP extraction under an explicit proxy trust model.
//!
//! # Design Decisions
//! - Production honors only headers written by the trusted edge, in fixed order
//! - Other environments also accept conventional proxy headers
//! - Proxy chains use the left-most (originating) entry
//! - No usable header yields the shared `"unknown"` bucket, never a bypass

use std::net::{IpAddr, SocketAddr};

use axum::http::{HeaderMap, HeaderName};

use crate::config::{Environment, SecurityConfig};

/// Sentinel used when no trusted header carries a client address.
pub const UNKNOWN_CLIENT_IP: &str = "unknown";

/// Resolves the originating client address from proxy headers.
#[derive(Debug, Clone)]
pub struct ClientIpResolver {
    trusted: Vec<HeaderName>,
    development: Vec<HeaderName>,
}

impl ClientIpResolver {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            trusted: parse_names(&config.trusted_ip_headers),
            development: parse_names(&config.development_ip_headers),
        }
    }

    /// Header names consulted for `environment`, in priority order.
    pub fn headers_for(&self, environment: Environment) -> Vec<&HeaderName> {
        let mut names: Vec<&HeaderName> = self.trusted.iter().collect();
        if !environment.is_production() {
            names.extend(self.development.iter().filter(|n| !self.trusted.contains(n)));
        }
        names
    }

    pub fn resolve(&self, headers: &HeaderMap, environment: Environment) -> String {
        for name in self.headers_for(environment) {
            let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
                continue;
            };
            if let Some(ip) = first_hop(value) {
                return ip.to_string();
            }
            tracing::debug!(header = %name, "Ignoring unparseable client IP header");
        }
        UNKNOWN_CLIENT_IP.to_string()
    }
}

fn parse_names(names: &[String]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|n| match HeaderName::from_bytes(n.trim().to_ascii_lowercase().as_bytes()) {
            Ok(name) => Some(name),
            Err(_) => {
                tracing::warn!(header = %n, "Ignoring invalid IP header name in config");
                None
            }
        })
        .collect()
}

/// Left-most address of a comma-separated proxy chain.
fn first_hop(value: &str) -> Option<IpAddr> {
    let first = value.split(',').next()?.trim();
    first
        .parse::<IpAddr>()
        .ok()
        .or_else(|| first.parse::<SocketAddr>().ok().map(|s| s.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn resolver() -> ClientIpResolver {
        ClientIpResolver::new(&SecurityConfig::default())
    }

    #[test]
    fn test_production_ignores_spoofable_headers() {
        let h = headers(&[("x-forwarded-for", "198.51.100.9")]);
        assert_eq!(resolver().resolve(&h, Environment::Production), UNKNOWN_CLIENT_IP);
        assert_eq!(resolver().resolve(&h, Environment::Development), "198.51.100.9");
    }

    #[test]
    fn test_trusted_priority_order() {
        let h = headers(&[
            ("cf-connecting-ip", "203.0.113.2"),
            ("x-vercel-forwarded-for", "203.0.113.1"),
            ("x-forwarded-for", "198.51.100.9"),
        ]);
        assert_eq!(resolver().resolve(&h, Environment::Production), "203.0.113.1");
        assert_eq!(resolver().resolve(&h, Environment::Development), "203.0.113.1");
    }

    #[test]
    fn test_left_most_chain_entry() {
        let h = headers(&[("x-vercel-forwarded-for", "203.0.113.1, 10.0.0.1, 10.0.0.2")]);
        assert_eq!(resolver().resolve(&h, Environment::Production), "203.0.113.1");
    }

    #[test]
    fn test_garbage_falls_through() {
        let h = headers(&[
            ("x-vercel-forwarded-for", "not-an-ip"),
            ("cf-connecting-ip", "2001:db8::1"),
        ]);
        assert_eq!(resolver().resolve(&h, Environment::Production), "2001:db8::1");
    }

    #[test]
    fn test_socket_address_value() {
        let h = headers(&[("x-real-ip", "198.51.100.9:51234")]);
        assert_eq!(resolver().resolve(&h, Environment::Test), "198.51.100.9");
    }

    #[test]
    fn test_no_headers_is_unknown() {
        assert_eq!(
            resolver().resolve(&HeaderMap::new(), Environment::Development),
            UNKNOWN_CLIENT_IP
        );
    }
}

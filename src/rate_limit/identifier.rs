//! Typed rate-limit keys.

use std::fmt;

/// Which dimension a key limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Email,
    Ip,
}

impl IdentifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::Email => "email",
            IdentifierKind::Ip => "ip",
        }
    }
}

/// A limiter key rendered as `{kind}:{value}`.
///
/// Values are always digests; raw addresses never become keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitIdentifier {
    kind: IdentifierKind,
    value: String,
}

impl RateLimitIdentifier {
    pub fn email(email_hash: impl Into<String>) -> Self {
        Self {
            kind: IdentifierKind::Email,
            value: email_hash.into(),
        }
    }

    pub fn ip(hashed_ip: impl Into<String>) -> Self {
        Self {
            kind: IdentifierKind::Ip,
            value: hashed_ip.into(),
        }
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RateLimitIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.value)
    }
}

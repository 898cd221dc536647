//! Escaping and normalization applied right before storage and CRM transmission.

use crate::identity::{HashError, IdentityHasher};
use crate::intake::types::{SanitizedContactData, SpanAttributes};
use crate::intake::validation::ValidatedSubmission;

/// Escape text for any HTML rendering context.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

/// Turns a validated submission into [`SanitizedContactData`].
#[derive(Debug, Clone)]
pub struct Sanitizer {
    hasher: IdentityHasher,
}

impl Sanitizer {
    pub fn new(hasher: IdentityHasher) -> Self {
        Self { hasher }
    }

    pub fn sanitize(
        &self,
        validated: &ValidatedSubmission,
        client_ip: &str,
        correlation_id: Option<&str>,
    ) -> Result<SanitizedContactData, HashError> {
        let safe_email = validated.email().to_lowercase();
        let email_hash = self.hasher.hash_email(&safe_email)?;
        let hashed_ip = self.hasher.hash_ip(client_ip)?;

        let mut span_attributes = SpanAttributes::new();
        span_attributes.insert("email", self.hasher.hash_span(&safe_email)?);
        span_attributes.insert("ip", self.hasher.hash_span(client_ip)?);
        if let Some(id) = correlation_id.filter(|id| !id.trim().is_empty()) {
            span_attributes.insert("correlation", self.hasher.hash_span(id)?);
        }

        Ok(SanitizedContactData {
            safe_name: escape_html(validated.name()),
            safe_email,
            safe_phone: validated.phone().map(escape_html),
            safe_message: escape_html(validated.message()),
            email_hash,
            hashed_ip,
            span_attributes,
        })
    }
}

//! Salted SHA-256 hashing of personal identifiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::HashingConfig;
use crate::store::LeadId;

/// What a digest is used for. Each purpose has a distinct salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashPurpose {
    Email,
    Ip,
    Span,
    Idempotency,
}

impl HashPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            HashPurpose::Email => "email",
            HashPurpose::Ip => "ip",
            HashPurpose::Span => "span",
            HashPurpose::Idempotency => "idempotency",
        }
    }
}

/// Errors raised while hashing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("cannot hash an empty {} value", .0.as_str())]
    EmptyInput(HashPurpose),
}

/// Token attached to CRM writes so a repeated write is recognized as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdempotencyKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded SHA-256 of `salt` and `value`.
pub fn hash(value: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hashes identifiers with the configured per-purpose salts.
#[derive(Clone)]
pub struct IdentityHasher {
    salts: HashingConfig,
}

impl IdentityHasher {
    pub fn new(salts: HashingConfig) -> Self {
        Self { salts }
    }

    fn salt(&self, purpose: HashPurpose) -> &str {
        match purpose {
            HashPurpose::Email => &self.salts.email_salt,
            HashPurpose::Ip => &self.salts.ip_salt,
            HashPurpose::Span => &self.salts.span_salt,
            HashPurpose::Idempotency => &self.salts.idempotency_salt,
        }
    }

    /// Hash `value` for `purpose`. Blank input is an error so callers can fail closed.
    pub fn hash_for(&self, purpose: HashPurpose, value: &str) -> Result<String, HashError> {
        if value.trim().is_empty() {
            return Err(HashError::EmptyInput(purpose));
        }
        Ok(hash(value, self.salt(purpose)))
    }

    /// Emails are normalized first so case and padding do not produce new keys.
    pub fn hash_email(&self, email: &str) -> Result<String, HashError> {
        self.hash_for(HashPurpose::Email, &email.trim().to_lowercase())
    }

    pub fn hash_ip(&self, ip: &str) -> Result<String, HashError> {
        self.hash_for(HashPurpose::Ip, ip.trim())
    }

    /// Short digest for span attributes and log fields.
    pub fn hash_span(&self, value: &str) -> Result<String, HashError> {
        let mut digest = self.hash_for(HashPurpose::Span, value)?;
        digest.truncate(16);
        Ok(digest)
    }

    /// Derive the CRM idempotency key for a lead.
    pub fn idempotency_key(
        &self,
        lead_id: &LeadId,
        email_hash: &str,
    ) -> Result<IdempotencyKey, HashError> {
        if email_hash.is_empty() {
            return Err(HashError::EmptyInput(HashPurpose::Email));
        }
        let material = format!("{}:{}", lead_id, email_hash);
        self.hash_for(HashPurpose::Idempotency, &material)
            .map(IdempotencyKey)
    }
}

impl std::fmt::Debug for IdentityHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityHasher").finish_non_exhaustive()
    }
}

//! CRM synchronization.
//!
//! # Data Flow
//! ```text
//! Stored lead
//!     → sync.rs (idempotency key, retry loop, status patch)
//!     → client.rs (lookup by email, then create or update)
//!     → store patch: synced + contact id, or needs_sync
//! ```
//!
//! # Design Decisions
//! - Lookup and write together form one attempt
//! - Permanent 4xx failures end the retry loop early
//! - Sync never fails the submission; the store records what happened

pub mod client;
pub mod sync;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::IdempotencyKey;
use crate::resilience::Retryable;

pub use client::HubSpotClient;
pub use sync::{CrmSyncEngine, ReconcileSummary};
pub use types::{ContactProperties, CrmContact};

/// Errors from CRM calls. Response bodies are not captured.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("CRM responded with status {status}")]
    Status { status: u16 },

    #[error("CRM transport error: {0}")]
    Transport(String),

    #[error("CRM response decode error: {0}")]
    Decode(String),

    #[error("CRM misconfigured: {0}")]
    Config(String),
}

impl Retryable for CrmError {
    fn is_retryable(&self) -> bool {
        match self {
            // Client errors will not succeed on retry, except timeouts and throttling.
            CrmError::Status { status } => !(400..500).contains(status) || matches!(status, 408 | 429),
            CrmError::Transport(_) | CrmError::Decode(_) => true,
            CrmError::Config(_) => false,
        }
    }
}

/// Result type for CRM operations.
pub type CrmResult<T> = Result<T, CrmError>;

/// Contacts API used by the sync engine.
#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn find_contact_by_email(&self, email: &str) -> CrmResult<Option<CrmContact>>;

    async fn create_contact(
        &self,
        properties: &ContactProperties,
        key: &IdempotencyKey,
    ) -> CrmResult<CrmContact>;

    async fn update_contact(
        &self,
        contact_id: &str,
        properties: &ContactProperties,
        key: &IdempotencyKey,
    ) -> CrmResult<CrmContact>;
}

//! Primary lead store.
//!
//! # Data Flow
//! ```text
//! Orchestrator
//!     → insert_lead (required; failure fails the submission)
//! CRM sync engine
//!     → update_lead (sync bookkeeping; failures are logged and swallowed)
//! Reconciliation pass
//!     → leads_needing_sync (needs_sync, plus stale unattempted pending)
//! ```
//!
//! The store is the source of truth. A lead exists once `insert_lead` returns.

pub mod memory;
pub mod rest;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

pub use memory::MemoryLeadStore;
pub use rest::RestLeadStore;
pub use types::{
    LeadId, LeadPatch, LeadRecord, NewLead, SuspicionReason, SyncOutcome, SyncStatus,
};

/// Errors raised by store backends.
///
/// Response bodies are not captured: they can echo row values back.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store rejected request with status {status}")]
    Rejected { status: u16 },

    #[error("store returned no identifier for inserted lead")]
    MissingId,

    #[error("lead {0} not found")]
    NotFound(LeadId),

    #[error("store transport error: {0}")]
    Transport(String),

    #[error("store response decode error: {0}")]
    Decode(String),

    #[error("store misconfigured: {0}")]
    Config(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable lead persistence.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert a lead with sync status `pending` and return the stored record.
    async fn insert_lead(&self, lead: NewLead) -> StoreResult<LeadRecord>;

    /// Apply a sync-status patch to an existing lead.
    async fn update_lead(&self, id: &LeadId, patch: &LeadPatch) -> StoreResult<()>;

    /// Oldest leads whose CRM sync must be retried: every `needs_sync` lead,
    /// plus non-suspicious `pending` leads created before `stale_before` that
    /// were never attempted.
    async fn leads_needing_sync(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LeadRecord>>;
}

/// Build the configured store backend.
pub fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn LeadStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory lead store; leads are lost on restart");
            Ok(Arc::new(MemoryLeadStore::new()))
        }
        StoreBackend::Rest => Ok(Arc::new(RestLeadStore::new(config)?)),
    }
}

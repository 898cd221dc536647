//! Lead record types shared by every store backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::identity::IdempotencyKey;
use crate::intake::SanitizedContactData;

/// Store-assigned lead identifier.
///
/// REST backends may hand back numeric ids; they are kept in string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LeadId(String);

impl LeadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LeadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LeadId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => LeadId(n.to_string()),
            RawId::Text(s) => LeadId(s),
        })
    }
}

/// CRM synchronization state of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    NeedsSync,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::NeedsSync => "needs_sync",
        }
    }
}

/// Why a lead was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspicionReason {
    RateLimit,
}

/// A lead about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub is_suspicious: bool,
    pub suspicion_reason: Option<SuspicionReason>,
}

impl NewLead {
    pub fn from_sanitized(data: &SanitizedContactData) -> Self {
        Self {
            name: data.safe_name().to_string(),
            email: data.safe_email().to_string(),
            phone: data.safe_phone().map(str::to_string),
            message: data.safe_message().to_string(),
            is_suspicious: false,
            suspicion_reason: None,
        }
    }

    /// Mark the lead as suspicious. It is still stored.
    pub fn flagged(mut self, reason: SuspicionReason) -> Self {
        self.is_suspicious = true;
        self.suspicion_reason = Some(reason);
        self
    }

    /// Row body for insertion, with sync bookkeeping initialized.
    pub fn insert_row(&self) -> InsertRow<'_> {
        InsertRow {
            lead: self,
            hubspot_sync_status: SyncStatus::Pending,
            hubspot_retry_count: 0,
            hubspot_idempotency_key: None,
        }
    }
}

/// Wire form of an insert.
#[derive(Debug, Serialize)]
pub struct InsertRow<'a> {
    #[serde(flatten)]
    lead: &'a NewLead,
    hubspot_sync_status: SyncStatus,
    hubspot_retry_count: u32,
    hubspot_idempotency_key: Option<IdempotencyKey>,
}

/// A persisted lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: LeadId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub message: String,
    #[serde(default)]
    pub is_suspicious: bool,
    #[serde(default)]
    pub suspicion_reason: Option<SuspicionReason>,
    #[serde(default)]
    pub hubspot_sync_status: SyncStatus,
    #[serde(default)]
    pub hubspot_retry_count: u32,
    #[serde(default)]
    pub hubspot_idempotency_key: Option<IdempotencyKey>,
    #[serde(default)]
    pub hubspot_contact_id: Option<String>,
    #[serde(default)]
    pub hubspot_last_sync_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl LeadRecord {
    /// Build the record a store creates for `lead`.
    pub fn created(id: LeadId, lead: NewLead, at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            message: lead.message,
            is_suspicious: lead.is_suspicious,
            suspicion_reason: lead.suspicion_reason,
            hubspot_sync_status: SyncStatus::Pending,
            hubspot_retry_count: 0,
            hubspot_idempotency_key: None,
            hubspot_contact_id: None,
            hubspot_last_sync_attempt: None,
            created_at: Some(at),
        }
    }

    /// Whether a reconciliation pass should retry this lead.
    ///
    /// `needs_sync` always qualifies. A `pending` lead qualifies once it is
    /// older than `stale_before` with no recorded attempt; throttled leads never do.
    pub fn needs_reconciliation(&self, stale_before: DateTime<Utc>) -> bool {
        match self.hubspot_sync_status {
            SyncStatus::NeedsSync => true,
            SyncStatus::Pending => {
                !self.is_suspicious
                    && self.hubspot_last_sync_attempt.is_none()
                    && self.created_at.is_some_and(|at| at < stale_before)
            }
            SyncStatus::Synced => false,
        }
    }

    pub fn apply(&mut self, patch: &LeadPatch) {
        self.hubspot_sync_status = patch.hubspot_sync_status;
        if let Some(contact_id) = &patch.hubspot_contact_id {
            self.hubspot_contact_id = Some(contact_id.clone());
        }
        self.hubspot_retry_count = patch.hubspot_retry_count;
        self.hubspot_idempotency_key = Some(patch.hubspot_idempotency_key.clone());
        self.hubspot_last_sync_attempt = Some(patch.hubspot_last_sync_attempt);
    }
}

/// Final result of a sync run. `Synced` always carries the CRM contact id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced { contact_id: String },
    NeedsSync,
}

impl SyncOutcome {
    pub fn status(&self) -> SyncStatus {
        match self {
            SyncOutcome::Synced { .. } => SyncStatus::Synced,
            SyncOutcome::NeedsSync => SyncStatus::NeedsSync,
        }
    }
}

/// Sync bookkeeping written back onto a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadPatch {
    pub hubspot_sync_status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hubspot_contact_id: Option<String>,
    pub hubspot_retry_count: u32,
    pub hubspot_idempotency_key: IdempotencyKey,
    pub hubspot_last_sync_attempt: DateTime<Utc>,
}

impl LeadPatch {
    pub fn sync_result(
        outcome: SyncOutcome,
        attempts: u32,
        key: IdempotencyKey,
        at: DateTime<Utc>,
    ) -> Self {
        let status = outcome.status();
        let contact_id = match outcome {
            SyncOutcome::Synced { contact_id } => Some(contact_id),
            SyncOutcome::NeedsSync => None,
        };
        Self {
            hubspot_sync_status: status,
            hubspot_contact_id: contact_id,
            hubspot_retry_count: attempts,
            hubspot_idempotency_key: key,
            hubspot_last_sync_attempt: at,
        }
    }
}

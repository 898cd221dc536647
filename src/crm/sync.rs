//! Idempotent, retried CRM upsert with status reconciliation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::crm::{ContactProperties, CrmClient, CrmContact, CrmResult};
use crate::identity::{IdempotencyKey, IdentityHasher};
use crate::intake::SanitizedContactData;
use crate::observability::metrics;
use crate::resilience::{retry_with_backoff, RetryOutcome, RetryPolicy, Sleeper, TokioSleeper};
use crate::store::{LeadId, LeadPatch, LeadRecord, LeadStore, StoreResult, SyncOutcome, SyncStatus};

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub examined: usize,
    pub synced: usize,
    pub still_pending: usize,
}

/// Age after which a never-attempted `pending` lead is treated as abandoned.
pub const DEFAULT_STALE_PENDING: Duration = Duration::from_secs(15 * 60);

/// Writes stored leads into the CRM and records the result on the lead.
pub struct CrmSyncEngine {
    crm: Arc<dyn CrmClient>,
    store: Arc<dyn LeadStore>,
    hasher: IdentityHasher,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl CrmSyncEngine {
    pub fn new(
        crm: Arc<dyn CrmClient>,
        store: Arc<dyn LeadStore>,
        hasher: IdentityHasher,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            crm,
            store,
            hasher,
            policy,
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
            stale_after: DEFAULT_STALE_PENDING,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// How long a `pending` lead may sit unattempted before reconciliation claims it.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Sync a freshly stored lead. Never fails; the returned status is also
    /// written to the store.
    pub async fn sync_lead(&self, lead_id: &LeadId, data: &SanitizedContactData) -> SyncStatus {
        let Some(key) = self.key_for_new_lead(lead_id, data) else {
            return SyncStatus::Pending;
        };
        let properties = ContactProperties::from_sanitized(data);
        self.run(lead_id, &properties, key, 0, None).await
    }

    /// Like [`sync_lead`](Self::sync_lead), but gives up after `deadline`.
    ///
    /// An abandoned run is recorded as `needs_sync` with its key and the
    /// attempts started so far.
    pub async fn sync_lead_within(
        &self,
        lead_id: &LeadId,
        data: &SanitizedContactData,
        deadline: Duration,
    ) -> SyncStatus {
        let Some(key) = self.key_for_new_lead(lead_id, data) else {
            return SyncStatus::Pending;
        };
        let properties = ContactProperties::from_sanitized(data);
        self.run(lead_id, &properties, key, 0, Some(deadline)).await
    }

    /// Retry leads marked `needs_sync`, plus stale never-attempted `pending`
    /// leads, oldest first, reusing any stored key.
    pub async fn reconcile(&self, limit: usize) -> StoreResult<ReconcileSummary> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let stale_before = self.clock.now() - stale_after;
        let leads = self.store.leads_needing_sync(stale_before, limit).await?;
        let mut summary = ReconcileSummary::default();

        for record in leads {
            summary.examined += 1;
            let Some(key) = self.key_for_record(&record) else {
                summary.still_pending += 1;
                continue;
            };
            let properties = ContactProperties::from_record(&record);
            match self
                .run(&record.id, &properties, key, record.hubspot_retry_count, None)
                .await
            {
                SyncStatus::Synced => summary.synced += 1,
                _ => summary.still_pending += 1,
            }
        }

        tracing::info!(
            examined = summary.examined,
            synced = summary.synced,
            still_pending = summary.still_pending,
            "Reconciliation pass complete"
        );
        Ok(summary)
    }

    fn key_for_new_lead(&self, lead_id: &LeadId, data: &SanitizedContactData) -> Option<IdempotencyKey> {
        match self.hasher.idempotency_key(lead_id, data.email_hash()) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(lead_id = %lead_id, error = %e, "Cannot derive idempotency key; lead left pending");
                None
            }
        }
    }

    fn key_for_record(&self, record: &LeadRecord) -> Option<IdempotencyKey> {
        if let Some(key) = &record.hubspot_idempotency_key {
            return Some(key.clone());
        }
        let derived = self
            .hasher
            .hash_email(&record.email)
            .and_then(|email_hash| self.hasher.idempotency_key(&record.id, &email_hash));
        match derived {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(lead_id = %record.id, error = %e, "Skipping lead without usable email");
                None
            }
        }
    }

    /// Lookup then create or update. One retry attempt.
    async fn upsert(
        &self,
        properties: &ContactProperties,
        key: &IdempotencyKey,
    ) -> CrmResult<CrmContact> {
        match self.crm.find_contact_by_email(&properties.email).await? {
            Some(existing) => {
                self.crm
                    .update_contact(&existing.id, properties, key)
                    .await
            }
            None => self.crm.create_contact(properties, key).await,
        }
    }

    async fn run(
        &self,
        lead_id: &LeadId,
        properties: &ContactProperties,
        key: IdempotencyKey,
        prior_attempts: u32,
        deadline: Option<Duration>,
    ) -> SyncStatus {
        let (sync, attempts) = {
            let started = AtomicU32::new(0);
            let retries = retry_with_backoff(&self.policy, self.sleeper.as_ref(), |attempt| {
                started.store(attempt, Ordering::Relaxed);
                self.upsert(properties, &key)
            });
            let outcome = match deadline {
                None => Some(retries.await),
                Some(limit) => tokio::time::timeout(limit, retries).await.ok(),
            };
            match outcome {
                Some(RetryOutcome {
                    result: Ok(contact),
                    attempts,
                }) => {
                    tracing::info!(lead_id = %lead_id, attempts, "Lead synced to CRM");
                    (
                        SyncOutcome::Synced {
                            contact_id: contact.id,
                        },
                        attempts,
                    )
                }
                Some(RetryOutcome {
                    result: Err(e),
                    attempts,
                }) => {
                    tracing::warn!(
                        lead_id = %lead_id,
                        attempts,
                        error = %e,
                        "CRM sync failed; lead marked for reconciliation"
                    );
                    (SyncOutcome::NeedsSync, attempts)
                }
                None => {
                    let attempts = started.load(Ordering::Relaxed);
                    tracing::warn!(
                        lead_id = %lead_id,
                        attempts,
                        deadline_ms = deadline.map_or(0, |d| d.as_millis() as u64),
                        "CRM sync exceeded its deadline; lead marked for reconciliation"
                    );
                    (SyncOutcome::NeedsSync, attempts)
                }
            }
        };
        let status = sync.status();
        metrics::record_crm_sync(status.as_str(), attempts);

        let patch = LeadPatch::sync_result(
            sync,
            prior_attempts.saturating_add(attempts),
            key,
            self.clock.now(),
        );
        if let Err(e) = self.store.update_lead(lead_id, &patch).await {
            tracing::error!(lead_id = %lead_id, error = %e, "Failed to record CRM sync status");
        }
        status
    }
}

impl std::fmt::Debug for CrmSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmSyncEngine")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

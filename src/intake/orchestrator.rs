//! Submission pipeline.
//!
//! ```text
//! guard (origin, honeypot) → validate → sanitize/hash → rate limit
//!     → insert lead (fatal on failure) → CRM sync (never fatal) → outcome
//! ```
//!
//! Inline syncs run under a deadline shorter than the request timeout, so a
//! slow CRM still yields the accepted response. Background syncs are tracked
//! and drained on shutdown.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::SyncMode;
use crate::crm::CrmSyncEngine;
use crate::error::{ForgeryReason, IntakeError, IntakeResult};
use crate::intake::sanitize::Sanitizer;
use crate::intake::types::{
    ContactSubmission, FieldError, SanitizedContactData, SubmissionOutcome, SubmissionResponse,
};
use crate::intake::validation::validate_submission;
use crate::observability::metrics;
use crate::rate_limit::RateLimiter;
use crate::security::RequestGuard;
use crate::store::{LeadId, LeadStore, NewLead, SuspicionReason};

/// Correlation id header, set by the request-id layer when absent.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inline sync deadline when none is configured.
pub const DEFAULT_INLINE_DEADLINE: Duration = Duration::from_secs(20);

/// Runs one contact submission end to end.
pub struct SubmissionOrchestrator {
    guard: RequestGuard,
    sanitizer: Sanitizer,
    rate_limiter: Arc<RateLimiter>,
    store: Arc<dyn LeadStore>,
    crm: Option<Arc<CrmSyncEngine>>,
    sync_mode: SyncMode,
    inline_deadline: Duration,
    background: Mutex<JoinSet<()>>,
}

impl SubmissionOrchestrator {
    pub fn new(
        guard: RequestGuard,
        sanitizer: Sanitizer,
        rate_limiter: Arc<RateLimiter>,
        store: Arc<dyn LeadStore>,
    ) -> Self {
        Self {
            guard,
            sanitizer,
            rate_limiter,
            store,
            crm: None,
            sync_mode: SyncMode::default(),
            inline_deadline: DEFAULT_INLINE_DEADLINE,
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Enable CRM sync after each accepted submission.
    pub fn with_crm(mut self, engine: Arc<CrmSyncEngine>, mode: SyncMode) -> Self {
        self.crm = Some(engine);
        self.sync_mode = mode;
        self
    }

    /// Bound on an inline sync. Keep it below the HTTP request timeout.
    pub fn with_inline_deadline(mut self, deadline: Duration) -> Self {
        self.inline_deadline = deadline;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Public entry point: the response body for the forms collaborator.
    pub async fn submit(&self, payload: ContactSubmission, headers: &HeaderMap) -> SubmissionResponse {
        self.process(payload, headers).await.response()
    }

    /// Run the pipeline and record the outcome.
    pub async fn process(&self, payload: ContactSubmission, headers: &HeaderMap) -> SubmissionOutcome {
        let start = Instant::now();
        let outcome = match self.run(payload, headers).await {
            Ok(outcome) => outcome,
            Err(e) => classify(e),
        };
        metrics::record_submission(outcome.label(), start);
        outcome
    }

    /// Outcome for a body that did not parse. Forgery checks still come first.
    pub fn process_malformed(&self, headers: &HeaderMap) -> SubmissionOutcome {
        let start = Instant::now();
        let error = match self.guard.check_origin(headers) {
            Err(reason) => IntakeError::ForgeryRejected(reason),
            Ok(()) => IntakeError::ValidationFailed(vec![FieldError::new(
                "body",
                "Request body must be a JSON contact submission",
            )]),
        };
        let outcome = classify(error);
        metrics::record_submission(outcome.label(), start);
        outcome
    }

    async fn run(&self, payload: ContactSubmission, headers: &HeaderMap) -> IntakeResult<SubmissionOutcome> {
        self.guard
            .check_origin(headers)
            .map_err(IntakeError::ForgeryRejected)?;
        if self.guard.is_honeypot_triggered(&payload) {
            return Err(IntakeError::ForgeryRejected(ForgeryReason::Honeypot));
        }

        let validated = validate_submission(payload).map_err(IntakeError::ValidationFailed)?;

        let client_ip = self.guard.resolve_client_ip(headers);
        let correlation_id = headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok());
        let data = self.sanitizer.sanitize(&validated, &client_ip, correlation_id)?;

        let span = tracing::info_span!(
            "submission",
            email = data.span_email(),
            ip = data.span_ip(),
            correlation = data.span_correlation(),
        );
        self.store_and_sync(data, &client_ip).instrument(span).await
    }

    async fn store_and_sync(
        &self,
        data: SanitizedContactData,
        client_ip: &str,
    ) -> IntakeResult<SubmissionOutcome> {
        let allowed = self
            .rate_limiter
            .check_rate_limit(data.safe_email(), client_ip)
            .await;

        let mut lead = NewLead::from_sanitized(&data);
        if !allowed {
            lead = lead.flagged(SuspicionReason::RateLimit);
        }
        let record = self.store.insert_lead(lead).await?;
        tracing::info!(lead_id = %record.id, suspicious = !allowed, "Lead stored");

        if !allowed {
            return Err(IntakeError::RateLimitExceeded { lead_id: record.id });
        }

        self.dispatch_sync(record.id.clone(), data).await;
        Ok(SubmissionOutcome::Accepted { lead_id: record.id })
    }

    async fn dispatch_sync(&self, lead_id: LeadId, data: SanitizedContactData) {
        let Some(engine) = self.crm.clone() else {
            tracing::debug!(lead_id = %lead_id, "CRM sync disabled; lead left pending");
            return;
        };
        match self.sync_mode {
            SyncMode::Inline => {
                engine
                    .sync_lead_within(&lead_id, &data, self.inline_deadline)
                    .await;
            }
            SyncMode::Background => {
                let span = tracing::Span::current();
                let mut tasks = self.background.lock().unwrap_or_else(PoisonError::into_inner);
                while tasks.try_join_next().is_some() {}
                tasks.spawn(
                    async move {
                        engine.sync_lead(&lead_id, &data).await;
                    }
                    .instrument(span),
                );
            }
        }
    }

    /// Background syncs not yet finished.
    pub fn background_syncs(&self) -> usize {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait up to `grace` for background syncs to finish. Returns how many were
    /// abandoned; their leads stay `pending` until reconciliation claims them.
    pub async fn drain_background_syncs(&self, grace: Duration) -> usize {
        let mut tasks = std::mem::take(
            &mut *self.background.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if tasks.is_empty() {
            return 0;
        }

        tracing::info!(in_flight = tasks.len(), "Waiting for background CRM syncs");
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_ok() {
            return 0;
        }
        let abandoned = tasks.len();
        tracing::warn!(abandoned, "Background CRM syncs abandoned at shutdown");
        tasks.shutdown().await;
        abandoned
    }
}

/// Map a pipeline error to its public outcome, logging with hashed context only.
fn classify(error: IntakeError) -> SubmissionOutcome {
    match error {
        IntakeError::ForgeryRejected(reason) => {
            tracing::warn!(reason = %reason, "Submission blocked");
            SubmissionOutcome::Blocked
        }
        IntakeError::ValidationFailed(errors) => {
            tracing::info!(fields = errors.len(), "Submission failed validation");
            SubmissionOutcome::Invalid(errors)
        }
        IntakeError::RateLimitExceeded { lead_id } => SubmissionOutcome::Throttled { lead_id },
        e @ (IntakeError::PersistenceFailed(_)
        | IntakeError::CrmSyncFailed(_)
        | IntakeError::Internal(_)) => {
            tracing::error!(error = %e, "Submission failed");
            SubmissionOutcome::Failed
        }
    }
}

impl std::fmt::Debug for SubmissionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionOrchestrator")
            .field("guard", &self.guard)
            .field("crm_enabled", &self.crm.is_some())
            .field("sync_mode", &self.sync_mode)
            .field("inline_deadline", &self.inline_deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{Environment, HashingConfig, RateLimitConfig, SecurityConfig, SiteConfig};
    use crate::identity::IdentityHasher;
    use crate::intake::messages;
    use crate::crm::{ContactProperties, CrmClient, CrmContact, CrmError, CrmResult};
    use crate::identity::IdempotencyKey;
    use crate::resilience::RetryPolicy;
    use crate::store::{MemoryLeadStore, SyncStatus};
    use async_trait::async_trait;
    use axum::http::HeaderValue;

    /// CRM whose lookups take `delay`, then fail with 503 when `healthy` is false.
    struct SlowCrm {
        delay: Duration,
        healthy: bool,
    }

    #[async_trait]
    impl CrmClient for SlowCrm {
        async fn find_contact_by_email(&self, _email: &str) -> CrmResult<Option<CrmContact>> {
            tokio::time::sleep(self.delay).await;
            if self.healthy {
                Ok(None)
            } else {
                Err(CrmError::Status { status: 503 })
            }
        }

        async fn create_contact(
            &self,
            _properties: &ContactProperties,
            _key: &IdempotencyKey,
        ) -> CrmResult<CrmContact> {
            Ok(CrmContact { id: "c-1".into() })
        }

        async fn update_contact(
            &self,
            contact_id: &str,
            _properties: &ContactProperties,
            _key: &IdempotencyKey,
        ) -> CrmResult<CrmContact> {
            Ok(CrmContact {
                id: contact_id.to_string(),
            })
        }
    }

    fn with_slow_crm(store: MemoryLeadStore, crm: SlowCrm, mode: SyncMode) -> SubmissionOrchestrator {
        let engine = CrmSyncEngine::new(
            Arc::new(crm),
            Arc::new(store.clone()),
            IdentityHasher::new(HashingConfig::default()),
            RetryPolicy::default(),
        );
        orchestrator(store).with_crm(Arc::new(engine), mode)
    }

    fn orchestrator(store: MemoryLeadStore) -> SubmissionOrchestrator {
        let hasher = IdentityHasher::new(HashingConfig::default());
        let guard = RequestGuard::new(
            &SiteConfig {
                site_url: "https://www.example.com".into(),
                environment: Environment::Production,
            },
            &SecurityConfig::default(),
        );
        let limiter = RateLimiter::new(
            RateLimitConfig::default(),
            hasher.clone(),
            Arc::new(ManualClock::default()),
        );
        SubmissionOrchestrator::new(guard, Sanitizer::new(hasher), Arc::new(limiter), Arc::new(store))
    }

    fn headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("origin", HeaderValue::from_static("https://www.example.com"));
        h.insert("x-vercel-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        h
    }

    fn payload() -> ContactSubmission {
        ContactSubmission {
            name: "Ann Lee".into(),
            email: "ann@example.com".into(),
            phone: None,
            message: "Hello, I need help.".into(),
            website: None,
        }
    }

    #[tokio::test]
    async fn test_accepted_without_crm_stays_pending() {
        let store = MemoryLeadStore::new();
        let outcome = orchestrator(store.clone()).process(payload(), &headers()).await;

        let lead_id = outcome.lead_id().cloned().unwrap();
        assert_eq!(outcome.label(), "accepted");
        let record = store.get(&lead_id).unwrap();
        assert_eq!(record.hubspot_sync_status, SyncStatus::Pending);
        assert!(!record.is_suspicious);
    }

    #[tokio::test]
    async fn test_missing_origin_blocked_before_store() {
        let store = MemoryLeadStore::new();
        let response = orchestrator(store.clone())
            .submit(payload(), &HeaderMap::new())
            .await;
        assert!(!response.success);
        assert_eq!(response.message, messages::BLOCKED);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_honeypot_blocked() {
        let store = MemoryLeadStore::new();
        let mut p = payload();
        p.website = Some("http://spam.example".into());
        let outcome = orchestrator(store.clone()).process(p, &headers()).await;
        assert_eq!(outcome, SubmissionOutcome::Blocked);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_returns_field_errors() {
        let store = MemoryLeadStore::new();
        let mut p = payload();
        p.email = "nope".into();
        let response = orchestrator(store.clone()).submit(p, &headers()).await;
        assert_eq!(response.message, messages::INVALID);
        assert_eq!(response.errors.unwrap()[0].field, "email");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_throttled_submission_still_stored() {
        let store = MemoryLeadStore::new();
        let orchestrator = orchestrator(store.clone());
        for _ in 0..3 {
            assert_eq!(orchestrator.process(payload(), &headers()).await.label(), "accepted");
        }

        let outcome = orchestrator.process(payload(), &headers()).await;
        assert_eq!(outcome.label(), "throttled");
        assert_eq!(outcome.response().message, messages::THROTTLED);

        let flagged: Vec<_> = store.all().into_iter().filter(|l| l.is_suspicious).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].suspicion_reason, Some(SuspicionReason::RateLimit));
        assert_eq!(Some(&flagged[0].id), outcome.lead_id());
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_malformed_body_checks_origin_first() {
        let o = orchestrator(MemoryLeadStore::new());
        assert_eq!(o.process_malformed(&HeaderMap::new()), SubmissionOutcome::Blocked);
        assert_eq!(o.process_malformed(&headers()).label(), "invalid");
    }

    #[tokio::test]
    async fn test_stored_fields_are_escaped() {
        let store = MemoryLeadStore::new();
        let mut p = payload();
        p.message = "<script>alert(1)</script> please call".into();
        let outcome = orchestrator(store.clone()).process(p, &headers()).await;
        let record = store.get(outcome.lead_id().unwrap()).unwrap();
        assert!(record.message.starts_with("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_slow_inline_sync_still_accepted() {
        let store = MemoryLeadStore::new();
        let crm = SlowCrm {
            delay: Duration::from_millis(300),
            healthy: false,
        };
        let orchestrator = with_slow_crm(store.clone(), crm, SyncMode::Inline)
            .with_inline_deadline(Duration::from_millis(100));

        let started = Instant::now();
        let outcome = orchestrator.process(payload(), &headers()).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(outcome.label(), "accepted");
        let record = store.get(outcome.lead_id().unwrap()).unwrap();
        assert_eq!(record.hubspot_sync_status, SyncStatus::NeedsSync);
        assert!(record.hubspot_idempotency_key.is_some());
    }

    #[tokio::test]
    async fn test_background_syncs_drained() {
        let store = MemoryLeadStore::new();
        let crm = SlowCrm {
            delay: Duration::from_millis(50),
            healthy: true,
        };
        let orchestrator = with_slow_crm(store.clone(), crm, SyncMode::Background);

        let outcome = orchestrator.process(payload(), &headers()).await;
        assert_eq!(outcome.label(), "accepted");
        assert_eq!(orchestrator.background_syncs(), 1);

        assert_eq!(orchestrator.drain_background_syncs(Duration::from_secs(5)).await, 0);
        assert_eq!(orchestrator.background_syncs(), 0);
        let record = store.get(outcome.lead_id().unwrap()).unwrap();
        assert_eq!(record.hubspot_sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_drain_reports_abandoned_syncs() {
        let store = MemoryLeadStore::new();
        let crm = SlowCrm {
            delay: Duration::from_secs(30),
            healthy: true,
        };
        let orchestrator = with_slow_crm(store.clone(), crm, SyncMode::Background);

        let outcome = orchestrator.process(payload(), &headers()).await;
        assert_eq!(
            orchestrator.drain_background_syncs(Duration::from_millis(50)).await,
            1
        );
        let record = store.get(outcome.lead_id().unwrap()).unwrap();
        assert_eq!(record.hubspot_sync_status, SyncStatus::Pending);
    }
}

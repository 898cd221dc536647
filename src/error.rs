//! Submission pipeline errors.

use thiserror::Error;

use crate::crm::CrmError;
use crate::identity::HashError;
use crate::intake::FieldError;
use crate::store::{LeadId, StoreError};

/// Why a request was rejected as forged or automated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeryReason {
    /// Neither `Origin` nor `Referer` was sent.
    MissingOrigin,
    /// A sent `Origin` or `Referer` does not name the expected host.
    OriginMismatch,
    /// No `Host` header and no usable site URL to compare against.
    UnknownHost,
    /// The honeypot field was filled in.
    Honeypot,
}

impl ForgeryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ForgeryReason::MissingOrigin => "missing_origin",
            ForgeryReason::OriginMismatch => "origin_mismatch",
            ForgeryReason::UnknownHost => "unknown_host",
            ForgeryReason::Honeypot => "honeypot",
        }
    }
}

impl std::fmt::Display for ForgeryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while processing a submission.
///
/// Never rendered to the client; the orchestrator maps each variant to a
/// fixed public message.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("request rejected: {0}")]
    ForgeryRejected(ForgeryReason),

    #[error("submission failed validation ({} field errors)", .0.len())]
    ValidationFailed(Vec<FieldError>),

    /// The lead was stored and flagged before this was raised.
    #[error("rate limit exceeded; lead {lead_id} stored as suspicious")]
    RateLimitExceeded { lead_id: LeadId },

    #[error("lead persistence failed: {0}")]
    PersistenceFailed(#[from] StoreError),

    #[error("CRM sync failed: {0}")]
    CrmSyncFailed(#[from] CrmError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<HashError> for IntakeError {
    fn from(e: HashError) -> Self {
        IntakeError::Internal(e.to_string())
    }
}

/// Result type for the submission pipeline.
pub type IntakeResult<T> = Result<T, IntakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_has_no_payload_data() {
        let err = IntakeError::ValidationFailed(vec![FieldError::new(
            "email",
            "Please enter a valid email address",
        )]);
        assert_eq!(err.to_string(), "submission failed validation (1 field errors)");

        let err = IntakeError::ForgeryRejected(ForgeryReason::Honeypot);
        assert_eq!(err.to_string(), "request rejected: honeypot");
    }

    #[test]
    fn test_store_error_converts() {
        let err: IntakeError = StoreError::Rejected { status: 503 }.into();
        assert!(matches!(err, IntakeError::PersistenceFailed(_)));
    }
}

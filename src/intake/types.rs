//! Submission input, derived data and the public response contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::LeadId;

/// User-facing messages. Fixed strings; nothing internal is ever appended.
pub mod messages {
    pub const ACCEPTED: &str = "Thank you for your message! We'll get back to you soon.";
    pub const BLOCKED: &str = "Unable to process your submission. Please try again.";
    pub const INVALID: &str = "Please check the form for errors and try again.";
    pub const THROTTLED: &str = "Too many submissions. Please try again later.";
    pub const FAILED: &str = "Something went wrong. Please try again later.";
}

/// Raw form payload as posted by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub message: String,
    /// Honeypot. Hidden from humans; bots fill it in.
    #[serde(default)]
    pub website: Option<String>,
}

/// A field-level validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Hash-only telemetry tags.
pub type SpanAttributes = BTreeMap<&'static str, String>;

/// Escaped and hashed view of a submission. Built once by the sanitizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedContactData {
    pub(crate) safe_name: String,
    pub(crate) safe_email: String,
    pub(crate) safe_phone: Option<String>,
    pub(crate) safe_message: String,
    pub(crate) email_hash: String,
    pub(crate) hashed_ip: String,
    pub(crate) span_attributes: SpanAttributes,
}

impl SanitizedContactData {
    pub fn safe_name(&self) -> &str {
        &self.safe_name
    }

    pub fn safe_email(&self) -> &str {
        &self.safe_email
    }

    pub fn safe_phone(&self) -> Option<&str> {
        self.safe_phone.as_deref()
    }

    pub fn safe_message(&self) -> &str {
        &self.safe_message
    }

    pub fn email_hash(&self) -> &str {
        &self.email_hash
    }

    pub fn hashed_ip(&self) -> &str {
        &self.hashed_ip
    }

    pub fn span_attributes(&self) -> &SpanAttributes {
        &self.span_attributes
    }

    fn span_attribute(&self, key: &str) -> &str {
        self.span_attributes.get(key).map(String::as_str).unwrap_or("")
    }

    pub(crate) fn span_email(&self) -> &str {
        self.span_attribute("email")
    }

    pub(crate) fn span_ip(&self) -> &str {
        self.span_attribute("ip")
    }

    pub(crate) fn span_correlation(&self) -> &str {
        self.span_attribute("correlation")
    }
}

/// Body returned to the forms collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// Terminal result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Stored; CRM sync dispatched or skipped.
    Accepted { lead_id: LeadId },
    /// Stored and flagged suspicious; the caller is told to slow down.
    Throttled { lead_id: LeadId },
    /// Forgery defenses rejected the request. Nothing stored.
    Blocked,
    /// Structural validation failed. Nothing stored.
    Invalid(Vec<FieldError>),
    /// The lead could not be stored, or an internal error occurred.
    Failed,
}

impl SubmissionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionOutcome::Accepted { .. } => "accepted",
            SubmissionOutcome::Throttled { .. } => "throttled",
            SubmissionOutcome::Blocked => "blocked",
            SubmissionOutcome::Invalid(_) => "invalid",
            SubmissionOutcome::Failed => "failed",
        }
    }

    pub fn lead_id(&self) -> Option<&LeadId> {
        match self {
            SubmissionOutcome::Accepted { lead_id } | SubmissionOutcome::Throttled { lead_id } => {
                Some(lead_id)
            }
            _ => None,
        }
    }

    pub fn response(&self) -> SubmissionResponse {
        let (success, message, errors) = match self {
            SubmissionOutcome::Accepted { .. } => (true, messages::ACCEPTED, None),
            SubmissionOutcome::Throttled { .. } => (false, messages::THROTTLED, None),
            SubmissionOutcome::Blocked => (false, messages::BLOCKED, None),
            SubmissionOutcome::Invalid(errors) => (false, messages::INVALID, Some(errors.clone())),
            SubmissionOutcome::Failed => (false, messages::FAILED, None),
        };
        SubmissionResponse {
            success,
            message: message.to_string(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_contract() {
        let accepted = SubmissionOutcome::Accepted {
            lead_id: LeadId::from("1".to_string()),
        }
        .response();
        assert!(accepted.success);
        assert_eq!(
            serde_json::to_value(&accepted).unwrap(),
            serde_json::json!({ "success": true, "message": messages::ACCEPTED })
        );

        let invalid = SubmissionOutcome::Invalid(vec![FieldError::new("email", "Invalid email")]);
        let body = serde_json::to_value(invalid.response()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"][0]["field"], "email");
    }

    #[test]
    fn test_honeypot_defaults_to_none() {
        let submission: ContactSubmission = serde_json::from_str(
            r#"{"name": "Ann Lee", "email": "ann@example.com", "message": "Hello, I need help."}"#,
        )
        .unwrap();
        assert!(submission.website.is_none());
        assert!(submission.phone.is_none());
    }
}

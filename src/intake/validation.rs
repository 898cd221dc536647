//! Structural validation of contact submissions.
//!
//! Validation decides whether a payload is well-formed. It never escapes or
//! rewrites content; that is the sanitizer's job.

use crate::intake::types::{ContactSubmission, FieldError};

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 100;
pub const EMAIL_MAX: usize = 254;
pub const PHONE_MAX: usize = 30;
pub const PHONE_MIN_DIGITS: usize = 7;
pub const MESSAGE_MIN: usize = 10;
pub const MESSAGE_MAX: usize = 5000;

/// A submission that passed structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission(ContactSubmission);

impl ValidatedSubmission {
    pub fn name(&self) -> &str {
        self.0.name.trim()
    }

    pub fn email(&self) -> &str {
        self.0.email.trim()
    }

    pub fn phone(&self) -> Option<&str> {
        self.0.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    pub fn message(&self) -> &str {
        self.0.message.trim()
    }
}

/// Check every field, collecting all errors.
pub fn validate_submission(
    submission: ContactSubmission,
) -> Result<ValidatedSubmission, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name_len = submission.name.trim().chars().count();
    if name_len < NAME_MIN {
        errors.push(FieldError::new("name", "Name must be at least 2 characters"));
    } else if name_len > NAME_MAX {
        errors.push(FieldError::new("name", "Name must be at most 100 characters"));
    }

    let email = submission.email.trim();
    if email.is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if email.len() > EMAIL_MAX || !is_plausible_email(email) {
        errors.push(FieldError::new("email", "Please enter a valid email address"));
    }

    if let Some(phone) = submission.phone.as_deref().map(str::trim) {
        if !phone.is_empty() && !is_plausible_phone(phone) {
            errors.push(FieldError::new("phone", "Please enter a valid phone number"));
        }
    }

    let message_len = submission.message.trim().chars().count();
    if message_len < MESSAGE_MIN {
        errors.push(FieldError::new("message", "Message must be at least 10 characters"));
    } else if message_len > MESSAGE_MAX {
        errors.push(FieldError::new("message", "Message must be at most 5000 characters"));
    }

    if errors.is_empty() {
        Ok(ValidatedSubmission(submission))
    } else {
        Err(errors)
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

fn is_plausible_phone(phone: &str) -> bool {
    if phone.len() > PHONE_MAX {
        return false;
    }
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.' | '+'));
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    allowed && digits >= PHONE_MIN_DIGITS
}

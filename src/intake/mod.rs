//! Contact submission intake.
//!
//! # Data Flow
//! ```text
//! POST /api/contact
//!     → orchestrator.rs (sequencing, outcome mapping)
//!     → validation.rs (structure)
//!     → sanitize.rs (escaping, hashing)
//!     → types.rs (response contract)
//! ```

pub mod orchestrator;
pub mod sanitize;
pub mod types;
pub mod validation;

pub use orchestrator::{SubmissionOrchestrator, REQUEST_ID_HEADER};
pub use sanitize::{escape_html, Sanitizer};
pub use types::{
    messages, ContactSubmission, FieldError, SanitizedContactData, SpanAttributes,
    SubmissionOutcome, SubmissionResponse,
};
pub use validation::{validate_submission, ValidatedSubmission};

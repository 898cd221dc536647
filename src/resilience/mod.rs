//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an external API:
//!     → retries.rs (run attempt, ask error if retryable)
//!     → backoff.rs (delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Every outbound client has a request timeout; retries sit above it
//! - Backoff is a pure function of the attempt number
//! - Permanent failures (bad request, auth) are not retried

pub mod backoff;
pub mod retries;

pub use backoff::{calculate_backoff, RetryPolicy};
pub use retries::{retry_with_backoff, RetryOutcome, Retryable, Sleeper, TokioSleeper};

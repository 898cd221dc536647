//! Outcome to HTTP response mapping.
//!
//! The body is always the JSON response contract; only the status varies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::intake::SubmissionOutcome;

pub fn status_for(outcome: &SubmissionOutcome) -> StatusCode {
    match outcome {
        SubmissionOutcome::Accepted { .. } => StatusCode::OK,
        SubmissionOutcome::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SubmissionOutcome::Blocked => StatusCode::FORBIDDEN,
        SubmissionOutcome::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
        SubmissionOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for SubmissionOutcome {
    fn into_response(self) -> Response {
        (status_for(&self), Json(self.response())).into_response()
    }
}

/// `GET /health` body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rate_limiter: &'static str,
}

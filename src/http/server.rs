//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the intake and health handlers
//! - Wire up middleware (request ID, tracing, body limit, timeout)
//! - Convert handler panics into the generic failure response
//! - Serve until the shutdown signal fires

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::FutureExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::request::{request_id_header, UuidRequestId};
use crate::http::response::HealthResponse;
use crate::intake::{ContactSubmission, SubmissionOrchestrator, SubmissionOutcome};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SubmissionOrchestrator>,
}

/// HTTP front end of the intake service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ServerConfig, orchestrator: Arc<SubmissionOrchestrator>) -> Self {
        let state = AppState { orchestrator };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/api/contact", post(submit_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id_header(), UuidRequestId))
                    .layer(PropagateRequestIdLayer::new(request_id_header()))
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(config.max_body_size))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ContactSubmission>, JsonRejection>,
) -> Response {
    let payload = match body {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            tracing::debug!(status = %rejection.status(), "Rejected unparseable submission body");
            return state.orchestrator.process_malformed(&headers).into_response();
        }
    };

    let start = Instant::now();
    let outcome = AssertUnwindSafe(state.orchestrator.process(payload, &headers))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::error!("Submission pipeline panicked");
            metrics::record_submission("failed", start);
            SubmissionOutcome::Failed
        });
    outcome.into_response()
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        rate_limiter: state.orchestrator.rate_limiter().backend_kind(),
    })
}

//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Services are built once, in dependency order, and shared by `Arc`
//! - The listener binds last so traffic only arrives when ready

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, IntakeConfig};
use crate::crm::{CrmError, CrmSyncEngine, HubSpotClient};
use crate::http::HttpServer;
use crate::identity::IdentityHasher;
use crate::intake::{Sanitizer, SubmissionOrchestrator};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::rate_limit::RateLimiter;
use crate::resilience::RetryPolicy;
use crate::security::RequestGuard;
use crate::store::{self, LeadStore, StoreError};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("lead store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("CRM setup failed: {0}")]
    Crm(#[from] CrmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every long-lived service, built once from configuration.
pub struct Services {
    pub orchestrator: Arc<SubmissionOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub store: Arc<dyn LeadStore>,
    pub crm_engine: Option<Arc<CrmSyncEngine>>,
}

/// The CRM sync engine, or `None` when CRM sync is disabled.
pub fn build_crm_engine(
    config: &IntakeConfig,
    store: Arc<dyn LeadStore>,
    hasher: IdentityHasher,
) -> Result<Option<Arc<CrmSyncEngine>>, CrmError> {
    if !config.crm.enabled {
        tracing::info!("CRM sync disabled; leads stay pending");
        return Ok(None);
    }
    let client = HubSpotClient::new(&config.crm)?;
    let engine = CrmSyncEngine::new(
        Arc::new(client),
        store,
        hasher,
        RetryPolicy::from(&config.retries),
    )
    .with_stale_after(Duration::from_secs(config.crm.stale_pending_secs));
    Ok(Some(Arc::new(engine)))
}

pub fn build_services(config: &IntakeConfig) -> Result<Services, StartupError> {
    let hasher = IdentityHasher::new(config.hashing.clone());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = store::from_config(&config.store)?;
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit.clone(),
        hasher.clone(),
        clock,
    ));
    let crm_engine = build_crm_engine(config, store.clone(), hasher.clone())?;

    let mut orchestrator = SubmissionOrchestrator::new(
        RequestGuard::new(&config.site, &config.security),
        Sanitizer::new(hasher),
        rate_limiter.clone(),
        store.clone(),
    );
    if let Some(engine) = &crm_engine {
        orchestrator = orchestrator
            .with_crm(engine.clone(), config.crm.sync_mode)
            .with_inline_deadline(Duration::from_millis(config.crm.inline_timeout_ms));
    }

    tracing::info!(
        environment = ?config.site.environment,
        store = ?config.store.backend,
        crm_enabled = crm_engine.is_some(),
        sync_mode = ?config.crm.sync_mode,
        "Services initialized"
    );

    Ok(Services {
        orchestrator: Arc::new(orchestrator),
        rate_limiter,
        store,
        crm_engine,
    })
}

/// Build services, bind, and serve until `shutdown` fires, then drain
/// background CRM syncs.
pub async fn run(config: IntakeConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = build_services(&config)?;
    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config.server, services.orchestrator.clone());
    server.run(listener, shutdown.subscribe()).await?;

    let abandoned = services
        .orchestrator
        .drain_background_syncs(Duration::from_secs(config.crm.drain_timeout_secs))
        .await;
    if abandoned > 0 {
        tracing::warn!(abandoned, "Leads left pending for reconciliation");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_services() {
        let services = build_services(&IntakeConfig::default()).unwrap();
        assert!(services.crm_engine.is_none());
        assert_eq!(services.rate_limiter.backend_kind(), "memory");
    }

    #[test]
    fn test_enabled_crm_without_token_fails() {
        let mut config = IntakeConfig::default();
        config.crm.enabled = true;
        assert!(matches!(
            build_services(&config),
            Err(StartupError::Crm(CrmError::Config(_)))
        ));
    }

    #[test]
    fn test_enabled_crm_builds_engine() {
        let mut config = IntakeConfig::default();
        config.crm.enabled = true;
        config.crm.access_token = Some("pat-token".into());
        let services = build_services(&config).unwrap();
        assert!(services.crm_engine.is_some());
    }
}

//! Lead intake service.
//!
//! # Architecture Overview
//!
//! ```text
//!     POST /api/contact
//!     ─────────────────▶ http server ──▶ orchestrator
//!                                          │
//!                        ┌─────────────────┼──────────────────┐
//!                        ▼                 ▼                  ▼
//!                  request guard     sanitizer/hasher    rate limiter ──▶ Redis REST
//!                                          │                              (or memory)
//!                                          ▼
//!                                     lead store  ─────────▶ PostgREST (or memory)
//!                                          │
//!                                          ▼
//!                                   CRM sync engine ───────▶ HubSpot contacts API
//!                                   (retry + backoff)
//! ```

use lead_intake::config::load_from_env;
use lead_intake::lifecycle::{startup, Shutdown};
use lead_intake::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_from_env(None)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        bind_address = %config.server.bind_address,
        environment = ?config.site.environment,
        "lead-intake v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    startup::run(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

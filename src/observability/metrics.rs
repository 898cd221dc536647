//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lead_submissions_total` (counter): submissions by terminal outcome
//! - `lead_submission_duration_seconds` (histogram): pipeline latency
//! - `lead_rate_limited_total` (counter): denials by identifier kind
//! - `lead_crm_sync_total` (counter): sync runs by final status
//! - `lead_crm_sync_attempts` (histogram): attempts used per sync run
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_submission(outcome: &'static str, start: Instant) {
    counter!("lead_submissions_total", "outcome" => outcome).increment(1);
    histogram!("lead_submission_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(identifier: &'static str) {
    counter!("lead_rate_limited_total", "identifier" => identifier).increment(1);
}

pub fn record_crm_sync(status: &'static str, attempts: u32) {
    counter!("lead_crm_sync_total", "status" => status).increment(1);
    histogram!("lead_crm_sync_attempts").record(f64::from(attempts));
}

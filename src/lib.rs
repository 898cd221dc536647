//! Lead intake and CRM synchronization service.

pub mod clock;
pub mod config;
pub mod crm;
pub mod error;
pub mod http;
pub mod identity;
pub mod intake;
pub mod lifecycle;
pub mod observability;
pub mod rate_limit;
pub mod resilience;
pub mod security;
pub mod store;

pub use config::schema::IntakeConfig;
pub use error::{IntakeError, IntakeResult};
pub use http::HttpServer;
pub use intake::SubmissionOrchestrator;
pub use lifecycle::Shutdown;

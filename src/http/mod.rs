//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, handlers)
//!     → request.rs (request ID)
//!     → submission orchestrator
//!     → response.rs (outcome → status + JSON body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::UuidRequestId;
pub use response::{status_for, HealthResponse};
pub use server::{AppState, HttpServer};

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming submission:
//!     → guard.rs (origin/referer check, honeypot)
//!     → client_ip.rs (trusted-proxy IP extraction)
//!     → rate limiting (see `rate_limit`)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: both Origin and Referer must match when both are sent
//! - Fail closed: reject on any check failure
//! - Rejections carry no detail back to the caller

pub mod client_ip;
pub mod guard;

pub use client_ip::{ClientIpResolver, UNKNOWN_CLIENT_IP};
pub use guard::RequestGuard;

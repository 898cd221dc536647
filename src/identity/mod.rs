//! Identity hashing.
//!
//! # Security Constraints
//! - Raw email addresses, IPs and correlation ids never reach logs or telemetry
//! - Each purpose uses its own salt, so an email hash cannot be joined
//!   against a telemetry hash of the same address
//! - Digests are deterministic: rate-limit keys and idempotency keys depend on it

pub mod hasher;

pub use hasher::{hash, HashError, HashPurpose, IdempotencyKey, IdentityHasher};

//! Process-local fixed-window limiter.
//!
//! Used when no distributed backend is configured. Counts are per instance,
//! so a horizontally scaled deployment admits up to `max * instances`.
//!
//! A window covers `[start, reset_at]` inclusive. Expired windows are swept
//! every [`PURGE_INTERVAL`] checks so the map tracks only live identifiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::clock::Clock;
use crate::rate_limit::RateLimitIdentifier;

/// Checks between sweeps of expired windows.
pub const PURGE_INTERVAL: u64 = 1024;

/// Window state for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

/// Fixed-window counter map keyed by `{kind}:{value}`.
pub struct MemoryWindowLimiter {
    windows: DashMap<String, WindowEntry>,
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    checks: AtomicU64,
    purge_interval: u64,
}

impl MemoryWindowLimiter {
    pub fn new(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            clock,
            checks: AtomicU64::new(0),
            purge_interval: PURGE_INTERVAL,
        }
    }

    /// Sweep expired windows every `interval` checks instead of [`PURGE_INTERVAL`].
    pub fn with_purge_interval(mut self, interval: u64) -> Self {
        self.purge_interval = interval.max(1);
        self
    }

    /// Charge one request to `id`. Denied requests are not counted.
    pub fn check(&self, id: &RateLimitIdentifier) -> bool {
        let n = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.purge_interval == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, tracked = self.windows.len(), "Purged expired rate-limit windows");
            }
        }
        self.admit(id)
    }

    fn admit(&self, id: &RateLimitIdentifier) -> bool {
        let now = self.clock.now();
        // The entry guard holds the shard lock, so read-modify-write is atomic per key.
        let mut entry = self.windows.entry(id.key()).or_insert(WindowEntry {
            count: 0,
            reset_at: now + self.window,
        });

        if now > entry.reset_at {
            *entry = WindowEntry {
                count: 0,
                reset_at: now + self.window,
            };
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    pub fn entry(&self, id: &RateLimitIdentifier) -> Option<WindowEntry> {
        self.windows.get(&id.key()).map(|e| *e)
    }

    /// Drop windows that have already expired.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, e| e.reset_at >= now);
        before.saturating_sub(self.windows.len())
    }

    pub fn clear(&self) {
        self.windows.clear();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl std::fmt::Debug for MemoryWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWindowLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("tracked", &self.windows.len())
            .finish()
    }
}

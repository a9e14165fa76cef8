//! Windowed per-identity request throttling.
//!
//! The counter sits behind the [`RateLimitStore`] trait so a shared store
//! (keyed counters with expiry) can replace the in-process map when the
//! service runs as multiple instances. [`MemoryRateLimitStore`] is the
//! single-instance implementation.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Backing store for windowed counters keyed by identity (an email, a
/// source address). `record` bumps the counter for the current window and
/// returns the post-increment count; an expired window resets to 1.
pub trait RateLimitStore: Send + Sync {
    fn record(&self, key: &str, window: Duration) -> u32;
}

struct WindowEntry {
    count: u32,
    window_started_at: DateTime<Utc>,
}

/// In-process store. Counters for one identity reset when their window
/// lapses; stale entries for other identities are pruned opportunistically
/// on each write so the map stays bounded.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn record(&self, key: &str, window: Duration) -> u32 {
        let now = Utc::now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        entries.retain(|_, entry| now - entry.window_started_at < window);

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            window_started_at: now,
        });
        entry.count += 1;
        entry.count
    }
}

/// Policy wrapper: at most `max_attempts` recorded per identity within
/// `window`.
pub struct RateLimiter<S: RateLimitStore> {
    store: S,
    max_attempts: u32,
    window: Duration,
}

impl<S: RateLimitStore> RateLimiter<S> {
    pub fn new(store: S, max_attempts: u32, window: Duration) -> Self {
        Self {
            store,
            max_attempts,
            window,
        }
    }

    /// Record one attempt for `key`. Returns `false` when the identity
    /// has exhausted its budget for the current window.
    pub fn check(&self, key: &str) -> bool {
        self.store.record(key, self.window) <= self.max_attempts
    }
}

// ============================================================================
// Tests
// ============================================================================

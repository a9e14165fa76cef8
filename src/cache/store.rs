//! Tenant-scoped response cache.
//!
//! List pages render instantly from here while a background fetch
//! replaces the entry. Entries are keyed by (tenant, name) and a tenant
//! switch drops every other tenant's entries, so a request issued after
//! the switch can never observe a mix of old and new tenant data. The
//! credential itself is never cached here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Consider cached dashboard data stale after 5 minutes. Agent and
/// number lists change much faster than they are expensive to fetch.
const CACHE_STALE_MINUTES: i64 = 5;

/// A cached value plus when it was stored.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() >= CACHE_STALE_MINUTES
    }
}

struct Entry {
    value: serde_json::Value,
    cached_at: DateTime<Utc>,
}

/// Clone is cheap - entries live behind a shared Arc.
#[derive(Clone, Default)]
pub struct CacheStore {
    entries: Arc<Mutex<HashMap<(String, String), Entry>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: DeserializeOwned>(&self, tenant: &str, name: &str) -> Option<Cached<T>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(&(tenant.to_string(), name.to_string()))?;
        match serde_json::from_value(entry.value.clone()) {
            Ok(data) => Some(Cached {
                data,
                cached_at: entry.cached_at,
            }),
            Err(err) => {
                debug!(tenant = %tenant, name = %name, error = %err, "cached value no longer parses; ignoring");
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, tenant: &str, name: &str, data: &T) {
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(err) => {
                debug!(tenant = %tenant, name = %name, error = %err, "value not cacheable; skipping");
                return;
            }
        };
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            (tenant.to_string(), name.to_string()),
            Entry {
                value,
                cached_at: Utc::now(),
            },
        );
    }

    /// Drop a single entry, typically after a mutation invalidates the
    /// list it came from.
    pub fn remove(&self, tenant: &str, name: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.remove(&(tenant.to_string(), name.to_string()));
    }

    /// Drop everything cached for one tenant (sign-out, forced refresh).
    pub fn invalidate_tenant(&self, tenant: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|(t, _), _| t != tenant);
    }

    /// Drop everything cached for tenants *other than* `tenant`. Called
    /// on organization switch so stale cross-tenant data cannot leak
    /// into the new context.
    pub fn retain_only(&self, tenant: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|(t, _), _| t == tenant);
    }

    pub fn clear(&self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

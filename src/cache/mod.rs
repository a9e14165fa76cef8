//! In-memory caching of backend responses.
//!
//! Entries are keyed by (tenant, name) and expire by staleness rather
//! than eviction; the composition layer purges entries wholesale when
//! the active tenant changes.

pub mod store;

pub use store::{CacheStore, Cached};

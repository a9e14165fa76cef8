//! REST API layer for the dashboard backend.
//!
//! Responses arrive in a `{ data, meta }` envelope; failures in
//! `{ error: { code, message, details } }`. The `Transport` attaches
//! credentials, correlation ids, and idempotency keys, and handles the
//! single coordinated refresh-and-retry on auth failures. `ApiClient`
//! is the typed surface the rest of the application calls.

pub mod client;
pub mod error;
pub mod probe;
pub mod transport;

pub use client::ApiClient;
pub use error::{ApiError, ErrorBody};
pub use probe::{diagnose, Connectivity};
pub use transport::{Meta, Transport};

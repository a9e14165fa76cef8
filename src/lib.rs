//! Core client library for the Voxboard voice-agent dashboard.
//!
//! Voxboard is a multi-tenant dashboard for AI voice-calling agents:
//! configuring conversational agents, managing cloned voices,
//! provisioning phone numbers, running test calls, and buying call
//! credits. This crate carries everything below the UI:
//!
//! - [`auth`]: the credential coordinator (single-flight token refresh,
//!   change notification, readiness gating) and the email one-time-code
//!   sign-in flow with per-source throttling
//! - [`api`]: the authenticated transport (correlation ids, idempotency
//!   keys, one refresh-and-retry on auth failures), the error taxonomy,
//!   a connectivity probe, and the typed backend client
//! - [`models`]: wire types for agents, voices, phone numbers, billing
//! - [`cache`]: tenant-scoped response caching with staleness
//! - [`config`]: environment-driven origin selection and the persisted
//!   client config
//!
//! Bearer tokens live only in memory; nothing in this crate writes a
//! credential to disk.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use voxboard_core::api::ApiClient;
//! use voxboard_core::auth::HttpIdentityProvider;
//! use voxboard_core::config;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let origin = config::api_origin();
//! let provider = HttpIdentityProvider::new(reqwest::Client::new(), origin.clone());
//! let client = ApiClient::new(origin, Arc::new(provider))?;
//!
//! client.auth().refresh().await?;
//! let agents = client.list_agents().await?;
//! println!("{} agents configured", agents.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthCoordinator, Credential};

//! Authentication: credential coordination and passwordless sign-in.
//!
//! This module provides:
//! - `AuthCoordinator`: owns the bearer-token/tenant pair, serializes
//!   refreshes, and broadcasts credential changes
//! - `OtpService`: email one-time-password flow issuing session cookies
//! - `RateLimiter`: windowed per-identity throttling behind a store trait
//!
//! Credentials live only in memory and are never written to disk.

pub mod coordinator;
pub mod otp;
pub mod provider;
pub mod rate_limit;

pub use coordinator::{AuthCoordinator, AuthError, Credential, IdentityProvider, Subscription};
pub use otp::{
    CodeSender, OtpRejection, OtpRequestError, OtpService, SameSite, SessionCookie, VerifyOutcome,
};
pub use provider::HttpIdentityProvider;
pub use rate_limit::{MemoryRateLimitStore, RateLimitStore, RateLimiter};

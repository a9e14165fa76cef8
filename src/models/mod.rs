//! Wire types for the dashboard backend API.
//!
//! Everything here mirrors the backend's JSON (camelCase field names,
//! optional fields defaulted) inside the `{ data, meta }` envelope that
//! the transport unwraps.

pub mod agent;
pub mod billing;
pub mod phone;
pub mod voice;

pub use agent::{Agent, AgentConfig, CallStatus, TestCall};
pub use billing::{CheckoutSession, CreditBalance, CreditPurchaseRequest};
pub use phone::{AvailableNumber, NumberSearchQuery, PhoneNumber};
pub use voice::{Voice, VoiceStatus, VoiceUploadSlot};

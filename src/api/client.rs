//! Typed client for the dashboard backend.
//!
//! Every method validates its input locally, then forwards over the
//! authenticated transport. List endpoints read through the tenant
//! cache; mutations drop the affected tenant's cached lists. The client
//! also owns the wiring that purges other tenants' cache entries when
//! the active credential changes organization.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::auth::{AuthCoordinator, IdentityProvider, Subscription};
use crate::cache::CacheStore;
use crate::models::{
    Agent, AgentConfig, AvailableNumber, CheckoutSession, CreditBalance, CreditPurchaseRequest,
    NumberSearchQuery, PhoneNumber, TestCall, Voice, VoiceUploadSlot,
};

use super::error::ApiError;
use super::transport::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Maximum concurrent per-agent detail requests.
/// Bounded so a large agent list cannot stampede the backend.
const MAX_CONCURRENT_REQUESTS: usize = 10;

/// Cache entry names for tenant-scoped lists.
const AGENTS_CACHE: &str = "agents";
const VOICES_CACHE: &str = "voices";
const NUMBERS_CACHE: &str = "phone_numbers";

// ============================================================================
// Client
// ============================================================================

pub struct ApiClient {
    transport: Transport,
    auth: Arc<AuthCoordinator>,
    cache: CacheStore,
    /// Keeps the tenant-change cache purge alive for the client's life.
    _cache_subscription: Subscription,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, ApiError> {
        Self::with_coordinator(base_url, Arc::new(AuthCoordinator::new(provider)))
    }

    pub fn with_coordinator(
        base_url: impl Into<String>,
        auth: Arc<AuthCoordinator>,
    ) -> Result<Self, ApiError> {
        let transport = Transport::new(base_url, Arc::clone(&auth))?;
        let cache = CacheStore::new();

        // A credential change to another tenant must not leave the old
        // tenant's data readable; sign-out drops everything.
        let purge = cache.clone();
        let subscription = auth.subscribe(move |credential| match credential {
            Some(credential) => purge.retain_only(&credential.tenant_id),
            None => purge.clear(),
        });

        Ok(Self {
            transport,
            auth,
            cache,
            _cache_subscription: subscription,
        })
    }

    pub fn auth(&self) -> &Arc<AuthCoordinator> {
        &self.auth
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    fn tenant(&self) -> Result<String, ApiError> {
        self.auth
            .credential()
            .map(|c| c.tenant_id)
            .ok_or(ApiError::SessionExpired)
    }

    /// Read-through helper for tenant-scoped list endpoints.
    async fn cached_list<T>(&self, name: &str, path: &str) -> Result<Vec<T>, ApiError>
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let tenant = self.tenant()?;
        if let Some(cached) = self.cache.get::<Vec<T>>(&tenant, name) {
            if !cached.is_stale() {
                return Ok(cached.data);
            }
        }
        let fresh: Vec<T> = self.transport.get(path).await?;
        self.cache.put(&tenant, name, &fresh);
        Ok(fresh)
    }

    fn drop_cached(&self, name: &str) {
        if let Ok(tenant) = self.tenant() {
            self.cache.remove(&tenant, name);
        }
    }

    // ===== Agents =====

    pub async fn list_agents(&self) -> Result<Vec<Agent>, ApiError> {
        self.cached_list(AGENTS_CACHE, "/v1/agents").await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Agent, ApiError> {
        self.transport.get(&format!("/v1/agents/{}", agent_id)).await
    }

    /// Full per-agent configurations, fetched with bounded concurrency.
    /// A failed detail fetch falls back to the list summary rather than
    /// failing the whole page.
    pub async fn list_agents_detailed(&self) -> Result<Vec<Agent>, ApiError> {
        let summaries = self.list_agents().await?;
        let detailed = stream::iter(summaries)
            .map(|agent| async move {
                match self.get_agent(&agent.id).await {
                    Ok(detail) => detail,
                    Err(err) => {
                        warn!(agent_id = %agent.id, error = %err, "agent detail fetch failed; using summary");
                        agent
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_REQUESTS)
            .collect::<Vec<_>>()
            .await;
        Ok(detailed)
    }

    pub async fn create_agent(&self, config: &AgentConfig) -> Result<Agent, ApiError> {
        if config.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(ApiError::Validation("agent name is required".to_string()));
        }
        let agent = self.transport.post("/v1/agents", config).await?;
        self.drop_cached(AGENTS_CACHE);
        Ok(agent)
    }

    pub async fn update_agent(&self, agent_id: &str, config: &AgentConfig) -> Result<Agent, ApiError> {
        let agent = self
            .transport
            .patch(&format!("/v1/agents/{}", agent_id), config)
            .await?;
        self.drop_cached(AGENTS_CACHE);
        Ok(agent)
    }

    pub async fn delete_agent(&self, agent_id: &str) -> Result<(), ApiError> {
        self.transport
            .delete(&format!("/v1/agents/{}", agent_id))
            .await?;
        self.drop_cached(AGENTS_CACHE);
        Ok(())
    }

    // ===== Voices =====

    pub async fn list_voices(&self) -> Result<Vec<Voice>, ApiError> {
        self.cached_list(VOICES_CACHE, "/v1/voices").await
    }

    /// Reserve a presigned upload slot for a voice sample. The caller
    /// uploads the audio to the returned URL directly.
    pub async fn request_voice_upload(&self, voice_name: &str) -> Result<VoiceUploadSlot, ApiError> {
        if voice_name.trim().is_empty() {
            return Err(ApiError::Validation("voice name is required".to_string()));
        }
        self.transport
            .post("/v1/voices/uploads", &serde_json::json!({ "name": voice_name.trim() }))
            .await
    }

    pub async fn delete_voice(&self, voice_id: &str) -> Result<(), ApiError> {
        self.transport
            .delete(&format!("/v1/voices/{}", voice_id))
            .await?;
        self.drop_cached(VOICES_CACHE);
        Ok(())
    }

    // ===== Phone numbers =====

    pub async fn list_phone_numbers(&self) -> Result<Vec<PhoneNumber>, ApiError> {
        self.cached_list(NUMBERS_CACHE, "/v1/phone-numbers").await
    }

    pub async fn search_available_numbers(
        &self,
        query: &NumberSearchQuery,
    ) -> Result<Vec<AvailableNumber>, ApiError> {
        if query.country.trim().is_empty() {
            return Err(ApiError::Validation("country is required".to_string()));
        }
        self.transport
            .get_with_query("/v1/phone-numbers/available", query)
            .await
    }

    pub async fn purchase_number(&self, e164: &str) -> Result<PhoneNumber, ApiError> {
        if !is_valid_e164(e164) {
            return Err(ApiError::Validation(format!(
                "not a valid E.164 number: {}",
                e164
            )));
        }
        let number = self
            .transport
            .post("/v1/phone-numbers", &serde_json::json!({ "e164": e164 }))
            .await?;
        self.drop_cached(NUMBERS_CACHE);
        Ok(number)
    }

    pub async fn assign_number(&self, number_id: &str, agent_id: &str) -> Result<PhoneNumber, ApiError> {
        let number = self
            .transport
            .post(
                &format!("/v1/phone-numbers/{}/assign", number_id),
                &serde_json::json!({ "agentId": agent_id }),
            )
            .await?;
        self.drop_cached(NUMBERS_CACHE);
        self.drop_cached(AGENTS_CACHE);
        Ok(number)
    }

    // ===== Billing =====

    pub async fn credit_balance(&self) -> Result<CreditBalance, ApiError> {
        self.transport.get("/v1/billing/credits").await
    }

    pub async fn purchase_credits(&self, amount_cents: i64) -> Result<CheckoutSession, ApiError> {
        if amount_cents <= 0 {
            return Err(ApiError::Validation(
                "purchase amount must be positive".to_string(),
            ));
        }
        self.transport
            .post("/v1/billing/credits/checkout", &CreditPurchaseRequest { amount_cents })
            .await
    }

    // ===== Test calls =====

    pub async fn start_test_call(&self, agent_id: &str, to_number: &str) -> Result<TestCall, ApiError> {
        if !is_valid_e164(to_number) {
            return Err(ApiError::Validation(format!(
                "not a valid E.164 number: {}",
                to_number
            )));
        }
        self.transport
            .post(
                &format!("/v1/agents/{}/test-calls", agent_id),
                &serde_json::json!({ "toNumber": to_number }),
            )
            .await
    }

    pub async fn get_test_call(&self, call_id: &str) -> Result<TestCall, ApiError> {
        self.transport
            .get(&format!("/v1/test-calls/{}", call_id))
            .await
    }
}

/// E.164: a `+`, then 8 to 15 digits, first digit nonzero.
fn is_valid_e164(number: &str) -> bool {
    let Some(digits) = number.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}

// ============================================================================
// Tests
// ============================================================================

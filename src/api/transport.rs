//! Authenticated HTTP transport.
//!
//! Thin decorator over `reqwest::Client`: every request carries the
//! bearer token and tenant header from the coordinator, a correlation id,
//! and an idempotency key on mutating verbs. A 401/403 triggers exactly
//! one coordinated refresh and one retry of the original request; a
//! second auth failure surfaces the uniform session-expired error. No
//! pooling, streaming, or backpressure concerns beyond what reqwest
//! already provides - one request in, one response out, one retry budget.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::AuthCoordinator;

use super::error::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow provider responses while failing fast enough for
/// a responsive dashboard.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Tenant scoping header attached to every authenticated request.
const CLIENT_ID_HEADER: &str = "x-client-id";

/// Correlation id header; one value spans both the original attempt and
/// its auth retry.
const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Idempotency header attached to mutating verbs; reused on the auth
/// retry so the backend can deduplicate.
const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

// ============================================================================
// Envelope
// ============================================================================

/// Success envelope: `{ "data": ..., "meta": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
    #[serde(default)]
    #[allow(dead_code)]
    meta: Option<Meta>,
}

/// Pagination metadata, present on list responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
}

// ============================================================================
// Transport
// ============================================================================

/// Clone is cheap - reqwest::Client uses Arc internally for connection
/// pooling, and the coordinator is shared.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    auth: Arc<AuthCoordinator>,
}

impl Transport {
    pub fn new(base_url: impl Into<String>, auth: Arc<AuthCoordinator>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, base_url, auth))
    }

    /// Share an existing client (and its connection pool).
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        auth: Arc<AuthCoordinator>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            auth,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(Method::GET, path, None::<&()>, None::<&()>).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize,
    {
        self.execute(Method::GET, path, None::<&()>, Some(query)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.execute(Method::POST, path, Some(body), None::<&()>).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.execute(Method::PUT, path, Some(body), None::<&()>).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.execute(Method::PATCH, path, Some(body), None::<&()>).await
    }

    /// DELETE endpoints return an empty or null `data`; only success
    /// matters to callers.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute::<serde_json::Value, (), ()>(Method::DELETE, path, None, None)
            .await
            .map(|_| ())
    }

    async fn execute<T, B, Q>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: Option<&Q>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
        Q: Serialize,
    {
        let url = format!("{}{}", self.base_url, path);
        let request_id = Uuid::new_v4().to_string();
        let mutating = !matches!(method, Method::GET | Method::HEAD);
        let idempotency_key = mutating.then(|| Uuid::new_v4().to_string());

        let mut refreshed = false;
        let mut rate_retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let request = self.build_request(
                method.clone(),
                &url,
                &request_id,
                idempotency_key.as_deref(),
                body,
                query,
            );
            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                let text = response.text().await?;
                // DELETE and a few mutations respond with no body at all.
                if text.is_empty() {
                    let envelope: Envelope<T> = serde_json::from_str(r#"{"data":null}"#)
                        .map_err(|e| {
                            ApiError::InvalidResponse(format!("empty response from {}: {}", path, e))
                        })?;
                    return Ok(envelope.data);
                }
                let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
                    ApiError::InvalidResponse(format!("failed to parse response from {}: {}", path, e))
                })?;
                return Ok(envelope.data);
            }

            if ApiError::is_auth_failure(status) {
                if refreshed {
                    warn!(request_id = %request_id, status = %status, "auth retry failed");
                    return Err(ApiError::SessionExpired);
                }
                refreshed = true;
                debug!(request_id = %request_id, status = %status, "auth failure, refreshing credential");
                if self.auth.refresh().await.is_err() {
                    return Err(ApiError::SessionExpired);
                }
                continue;
            }

            if status.as_u16() == 429 {
                rate_retries += 1;
                if rate_retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(request_id = %request_id, retry = rate_retries, backoff_ms, "rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &text));
        }
    }

    fn build_request<B, Q>(
        &self,
        method: Method,
        url: &str,
        request_id: &str,
        idempotency_key: Option<&str>,
        body: Option<&B>,
        query: Option<&Q>,
    ) -> RequestBuilder
    where
        B: Serialize,
        Q: Serialize,
    {
        let mut request = self
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id);

        if let Some(credential) = self.auth.credential() {
            request = request
                .bearer_auth(&credential.token)
                .header(CLIENT_ID_HEADER, &credential.tenant_id);
        }
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Hosted identity provider backed by the platform auth endpoints.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::coordinator::{Credential, IdentityProvider};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    token: String,
    tenant_id: String,
}

#[derive(Debug, Deserialize)]
struct RefreshEnvelope {
    data: RefreshData,
}

/// Calls the platform's session-refresh endpoint. The browser-equivalent
/// session grant (an HTTP-only cookie) rides along via the client's
/// cookie handling, so no secret is held here.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
}

impl HttpIdentityProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn refresh_credential(&self) -> Result<Credential> {
        let url = format!("{}/v1/auth/refresh", self.base_url);

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .context("Failed to send refresh request")?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Identity provider rejected refresh: {}", status);
        }

        let envelope: RefreshEnvelope = response
            .json()
            .await
            .context("Failed to parse refresh response")?;

        Ok(Credential::new(envelope.data.token, envelope.data.tenant_id))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_refresh_envelope() {
        let json = r#"{"data":{"token":"tok-123","tenantId":"org-9"},"meta":null}"#;
        let envelope: RefreshEnvelope =
            serde_json::from_str(json).expect("Failed to parse refresh envelope");
        assert_eq!(envelope.data.token, "tok-123");
        assert_eq!(envelope.data.tenant_id, "org-9");
    }
}

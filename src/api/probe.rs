//! Connectivity diagnosis against the backend health endpoint.
//!
//! When a request fails at the transport level the UI wants to tell the
//! user *which* layer broke: the host answered but the API is rejecting
//! requests, the name/route never resolved, the TLS handshake failed, or
//! the request simply timed out. An unauthenticated probe of `/health`
//! separates those cases.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

/// Probe timeout, deliberately shorter than the request timeout so a
/// diagnosis arrives while the failure is still on screen.
const PROBE_TIMEOUT_SECS: u64 = 5;

/// What the health probe concluded about the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Health endpoint answered 2xx.
    Healthy,
    /// Host answered but with an error status - the API itself is the
    /// problem, not the network path.
    ApiRejecting,
    /// Probe timed out before any response.
    Timeout,
    /// Connection could not be established (DNS, refused, unroutable).
    HostUnreachable,
    /// TCP connected but the secure channel could not be set up.
    TlsFailure,
}

/// Hit `{origin}/health` without credentials and classify the outcome.
pub async fn diagnose(client: &Client, origin: &str) -> Connectivity {
    let url = format!("{}/health", origin);
    let result = client
        .get(&url)
        .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
        .send()
        .await;

    let verdict = match result {
        Ok(response) if response.status().is_success() => Connectivity::Healthy,
        Ok(_) => Connectivity::ApiRejecting,
        Err(err) if err.is_timeout() => Connectivity::Timeout,
        Err(err) => {
            // reqwest folds TLS problems into connect errors; walking
            // the source chain distinguishes them.
            let mut chain = String::new();
            let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
            while let Some(e) = source {
                chain.push_str(&e.to_string().to_lowercase());
                chain.push(' ');
                source = e.source();
            }
            if chain.contains("tls") || chain.contains("certificate") {
                Connectivity::TlsFailure
            } else {
                Connectivity::HostUnreachable
            }
        }
    };
    debug!(origin = %origin, verdict = ?verdict, "connectivity probe");
    verdict
}

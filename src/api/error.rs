//! Error taxonomy for the API layer.
//!
//! Four families, matching how failures are handled:
//! - validation errors are rejected locally before any network call
//! - authentication errors are recovered once (refresh-and-retry) and
//!   only surfaced as `SessionExpired` when the retry also fails
//! - transport errors wrap the underlying client error
//! - upstream/business errors carry the provider's error envelope
//!   verbatim for display

use serde::Deserialize;
use thiserror::Error;

/// Maximum length for error response bodies carried in messages.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error envelope body: `{ "error": { "code", "message", "details" } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub(crate) error: ErrorBody,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("session expired - please sign in again")]
    SessionExpired,

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("rate limited - please wait before retrying")]
    RateLimited,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("{message}")]
    Upstream {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data in
    /// messages and logs.
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        // The cap is in bytes; back off to a char boundary so a
        // multibyte character straddling it cannot panic the slice.
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..cut],
            body.len()
        )
    }

    /// Classify a non-success response. Bodies that parse as the error
    /// envelope become `Upstream` so provider messages surface verbatim;
    /// anything else falls back to a status-based family.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
            // Auth statuses keep their family so the retry logic can act
            // on them; everything else surfaces the provider's message.
            if !matches!(status.as_u16(), 401 | 403 | 429) {
                return ApiError::Upstream {
                    code: envelope.error.code,
                    message: envelope.error.message,
                    details: envelope.error.details,
                };
            }
        }

        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::SessionExpired,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether the coordinated refresh-and-retry should run.
    pub fn is_auth_failure(status: reqwest::StatusCode) -> bool {
        matches!(status.as_u16(), 401 | 403)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn status_maps_to_error_family() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::SessionExpired
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, "nope"),
            ApiError::AccessDenied(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, ""),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, ""),
            ApiError::ServerError(_)
        ));
    }

    #[test]
    fn error_envelope_surfaces_provider_message() {
        let body = r#"{"error":{"code":"voice_in_use","message":"Voice is assigned to 2 agents","details":{"agentIds":["a1","a2"]}}}"#;
        let err = ApiError::from_status(StatusCode::CONFLICT, body);

        match err {
            ApiError::Upstream { code, message, details } => {
                assert_eq!(code, "voice_in_use");
                assert_eq!(message, "Voice is assigned to 2 agents");
                assert!(details.is_some());
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[test]
    fn auth_status_wins_over_envelope_body() {
        let body = r#"{"error":{"code":"token_expired","message":"expired"}}"#;
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, body),
            ApiError::SessionExpired
        ));
    }

    #[test]
    fn multibyte_bodies_truncate_at_a_char_boundary() {
        // 200 euro signs = 600 bytes; byte 500 lands mid-character.
        let body = "\u{20ac}".repeat(200);
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let rendered = err.to_string();
        assert!(rendered.contains("truncated, 600 total bytes"));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let rendered = err.to_string();
        assert!(rendered.contains("truncated, 2000 total bytes"));
        assert!(rendered.len() < 700);
    }
}

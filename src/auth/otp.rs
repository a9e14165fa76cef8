//! Email one-time-password sign-in flow.
//!
//! Session-level state machine: a code is requested and delivered by
//! email (AWAITING_CODE), then a submission either authenticates and
//! issues a short-lived session cookie, or is rejected. Rejection reasons
//! are distinct (missing fields, expired code, incorrect code, throttled)
//! but all collapse to the same REJECTED outcome.
//!
//! Code requests and submissions are each throttled per source address
//! through the [`RateLimiter`](super::rate_limit::RateLimiter), the
//! latter before any code comparison happens.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use super::rate_limit::{MemoryRateLimitStore, RateLimitStore, RateLimiter};

// ============================================================================
// Constants
// ============================================================================

/// Number of digits in a delivered code.
const OTP_CODE_DIGITS: usize = 6;

/// Minutes a delivered code stays valid.
/// Long enough for slow email delivery, short enough to limit guessing.
const OTP_TTL_MINUTES: i64 = 10;

/// Session cookie lifetime in minutes. Fixed one hour.
const SESSION_TTL_MINUTES: i64 = 60;

/// Length of the random session cookie value.
const SESSION_VALUE_LENGTH: usize = 32;

/// Maximum code submissions per source address per window.
const MAX_VERIFY_ATTEMPTS: u32 = 5;

/// Throttle window for code submissions, in minutes.
const VERIFY_WINDOW_MINUTES: i64 = 15;

// ============================================================================
// Types
// ============================================================================

/// Delivery seam for generated codes (email in production).
#[async_trait]
pub trait CodeSender: Send + Sync {
    async fn deliver(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum OtpRequestError {
    #[error("a valid email address is required")]
    InvalidEmail,

    #[error("could not deliver the code: {0}")]
    DeliveryFailed(String),

    #[error("too many code requests - try again later")]
    RateLimited,
}

/// Why a submission was rejected. Distinct messages, one outcome.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpRejection {
    #[error("email and code are required")]
    MissingField,

    #[error("no pending code for this address - request a new one")]
    NoPendingCode,

    #[error("the code has expired - request a new one")]
    CodeExpired,

    #[error("incorrect code")]
    CodeIncorrect,

    #[error("too many attempts - try again later")]
    RateLimited,
}

/// Terminal states of a verification attempt.
#[derive(Debug)]
pub enum VerifyOutcome {
    Authenticated(SessionCookie),
    Rejected(OtpRejection),
}

/// Cookie attributes match what the dashboard sets on sign-in:
/// HTTP-only, secure, strict same-site, fixed one-hour expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
}

#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl SessionCookie {
    fn issue() -> Self {
        let value: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_VALUE_LENGTH)
            .map(char::from)
            .collect();
        Self {
            value,
            expires_at: Utc::now() + Duration::minutes(SESSION_TTL_MINUTES),
            http_only: true,
            secure: true,
            same_site: SameSite::Strict,
        }
    }

    /// Render a `Set-Cookie` header value.
    pub fn header_value(&self, name: &str) -> String {
        let mut parts = vec![
            format!("{}={}", name, self.value),
            format!("Max-Age={}", SESSION_TTL_MINUTES * 60),
            "Path=/".to_string(),
        ];
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        parts.push(match self.same_site {
            SameSite::Strict => "SameSite=Strict".to_string(),
            SameSite::Lax => "SameSite=Lax".to_string(),
        });
        parts.join("; ")
    }
}

struct PendingCode {
    code: String,
    issued_at: DateTime<Utc>,
}

impl PendingCode {
    fn is_expired(&self) -> bool {
        Utc::now() - self.issued_at > Duration::minutes(OTP_TTL_MINUTES)
    }
}

// ============================================================================
// Service
// ============================================================================

/// Issues and checks one-time codes. Pending codes are per-process; a
/// multi-instance deployment swaps the rate-limit store for a shared one
/// and would also need shared pending-code storage.
pub struct OtpService<S: CodeSender, R: RateLimitStore = MemoryRateLimitStore> {
    sender: S,
    pending: Mutex<HashMap<String, PendingCode>>,
    limiter: RateLimiter<R>,
}

impl<S: CodeSender> OtpService<S> {
    pub fn new(sender: S) -> Self {
        let limiter = RateLimiter::new(
            MemoryRateLimitStore::new(),
            MAX_VERIFY_ATTEMPTS,
            Duration::minutes(VERIFY_WINDOW_MINUTES),
        );
        Self::with_limiter(sender, limiter)
    }
}

impl<S: CodeSender, R: RateLimitStore> OtpService<S, R> {
    pub fn with_limiter(sender: S, limiter: RateLimiter<R>) -> Self {
        Self {
            sender,
            pending: Mutex::new(HashMap::new()),
            limiter,
        }
    }

    /// Generate a code for `email` and deliver it. Requests are throttled
    /// per source address so a flooding caller cannot turn the sender
    /// into an email bomb. A code is recorded only once delivery
    /// succeeds, so a failed send leaves no pending state behind.
    pub async fn request_code(&self, email: &str, source: &str) -> Result<(), OtpRequestError> {
        if !self.limiter.check(&request_key(source)) {
            warn!(source = %source, "code request throttled");
            return Err(OtpRequestError::RateLimited);
        }

        let email = email.trim();
        if !is_plausible_email(email) {
            return Err(OtpRequestError::InvalidEmail);
        }

        let code: String = {
            let mut rng = rand::thread_rng();
            (0..OTP_CODE_DIGITS)
                .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
                .collect()
        };

        if let Err(err) = self.sender.deliver(email, &code).await {
            warn!(email = %email, error = %format!("{err:#}"), "code delivery failed");
            return Err(OtpRequestError::DeliveryFailed(format!("{err:#}")));
        }

        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.insert(
            email.to_ascii_lowercase(),
            PendingCode {
                code,
                issued_at: Utc::now(),
            },
        );
        debug!(email = %email, "one-time code issued");
        Ok(())
    }

    /// Check a submitted code. The throttle is applied per source address
    /// before anything else, so a flooding caller is rejected regardless
    /// of code correctness. A correct, unexpired code is consumed and a
    /// session cookie issued; an incorrect code leaves the pending entry
    /// in place for another try.
    pub fn verify(&self, email: &str, code: &str, source: &str) -> VerifyOutcome {
        if !self.limiter.check(&verify_key(source)) {
            warn!(source = %source, "verification throttled");
            return VerifyOutcome::Rejected(OtpRejection::RateLimited);
        }

        let email = email.trim();
        let code = code.trim();
        if email.is_empty() || code.is_empty() {
            return VerifyOutcome::Rejected(OtpRejection::MissingField);
        }

        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let key = email.to_ascii_lowercase();

        let Some(entry) = pending.get(&key) else {
            return VerifyOutcome::Rejected(OtpRejection::NoPendingCode);
        };

        if entry.is_expired() {
            pending.remove(&key);
            return VerifyOutcome::Rejected(OtpRejection::CodeExpired);
        }

        if entry.code != code {
            return VerifyOutcome::Rejected(OtpRejection::CodeIncorrect);
        }

        pending.remove(&key);
        debug!(email = %email, "one-time code accepted");
        VerifyOutcome::Authenticated(SessionCookie::issue())
    }
}

// Code requests and submissions draw on separate windowed budgets for
// the same source address.
fn request_key(source: &str) -> String {
    format!("request:{}", source)
}

fn verify_key(source: &str) -> String {
    format!("verify:{}", source)
}

/// Cheap shape check; real validation happens when the email bounces.
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct StubSender {
        sent: Mutex<Vec<(String, String)>>,
        fail: AtomicBool,
    }

    impl StubSender {
        fn last_code(&self) -> Option<String> {
            let sent = self.sent.lock().expect("lock poisoned");
            sent.last().map(|(_, code)| code.clone())
        }
    }

    #[async_trait]
    impl CodeSender for StubSender {
        async fn deliver(&self, email: &str, code: &str) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("smtp unavailable");
            }
            let mut sent = self.sent.lock().expect("lock poisoned");
            sent.push((email.to_string(), code.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn correct_code_authenticates_with_one_hour_cookie() {
        let service = OtpService::new(StubSender::default());
        service.request_code("user@example.com", "10.0.0.1").await.expect("request failed");
        let code = service.sender.last_code().expect("no code delivered");

        let outcome = service.verify("user@example.com", &code, "10.0.0.1");
        let VerifyOutcome::Authenticated(cookie) = outcome else {
            panic!("expected authentication");
        };

        let ttl = cookie.expires_at - Utc::now();
        assert!(ttl > Duration::minutes(59) && ttl <= Duration::minutes(60));
        assert!(cookie.http_only);
        assert!(cookie.secure);
        assert_eq!(cookie.same_site, SameSite::Strict);
        assert_eq!(cookie.value.len(), SESSION_VALUE_LENGTH);
    }

    #[tokio::test]
    async fn cookie_header_carries_hardening_attributes() {
        let cookie = SessionCookie::issue();
        let header = cookie.header_value("voxboard_session");

        assert!(header.starts_with(&format!("voxboard_session={}", cookie.value)));
        assert!(header.contains("Max-Age=3600"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Secure"));
        assert!(header.contains("SameSite=Strict"));
    }

    #[tokio::test]
    async fn incorrect_code_rejects_but_allows_retry() {
        let service = OtpService::new(StubSender::default());
        service.request_code("user@example.com", "10.0.0.1").await.expect("request failed");
        let code = service.sender.last_code().expect("no code delivered");

        let wrong = service.verify("user@example.com", "000000", "10.0.0.1");
        assert!(matches!(
            wrong,
            VerifyOutcome::Rejected(OtpRejection::CodeIncorrect)
        ));

        let right = service.verify("user@example.com", &code, "10.0.0.1");
        assert!(matches!(right, VerifyOutcome::Authenticated(_)));
    }

    #[tokio::test]
    async fn code_is_consumed_on_success() {
        let service = OtpService::new(StubSender::default());
        service.request_code("user@example.com", "10.0.0.1").await.expect("request failed");
        let code = service.sender.last_code().expect("no code delivered");

        assert!(matches!(
            service.verify("user@example.com", &code, "10.0.0.1"),
            VerifyOutcome::Authenticated(_)
        ));
        assert!(matches!(
            service.verify("user@example.com", &code, "10.0.0.1"),
            VerifyOutcome::Rejected(OtpRejection::NoPendingCode)
        ));
    }

    #[tokio::test]
    async fn expired_code_is_rejected_and_discarded() {
        let service = OtpService::new(StubSender::default());
        service.request_code("user@example.com", "10.0.0.1").await.expect("request failed");
        let code = service.sender.last_code().expect("no code delivered");

        // Backdate the pending entry past its ttl.
        {
            let mut pending = service.pending.lock().expect("lock poisoned");
            let entry = pending.get_mut("user@example.com").expect("entry missing");
            entry.issued_at = Utc::now() - Duration::minutes(OTP_TTL_MINUTES + 1);
        }

        assert!(matches!(
            service.verify("user@example.com", &code, "10.0.0.1"),
            VerifyOutcome::Rejected(OtpRejection::CodeExpired)
        ));
        assert!(matches!(
            service.verify("user@example.com", &code, "10.0.0.1"),
            VerifyOutcome::Rejected(OtpRejection::NoPendingCode)
        ));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_locally() {
        let service = OtpService::new(StubSender::default());
        assert!(matches!(
            service.verify("", "123456", "10.0.0.1"),
            VerifyOutcome::Rejected(OtpRejection::MissingField)
        ));
        assert!(matches!(
            service.verify("user@example.com", "  ", "10.0.0.1"),
            VerifyOutcome::Rejected(OtpRejection::MissingField)
        ));
    }

    #[tokio::test]
    async fn throttle_applies_regardless_of_code_correctness() {
        let limiter = RateLimiter::new(MemoryRateLimitStore::new(), 2, Duration::minutes(15));
        let service = OtpService::with_limiter(StubSender::default(), limiter);
        service.request_code("user@example.com", "10.0.0.1").await.expect("request failed");
        let code = service.sender.last_code().expect("no code delivered");

        assert!(matches!(
            service.verify("user@example.com", "000000", "10.0.0.9"),
            VerifyOutcome::Rejected(OtpRejection::CodeIncorrect)
        ));
        assert!(matches!(
            service.verify("user@example.com", "111111", "10.0.0.9"),
            VerifyOutcome::Rejected(OtpRejection::CodeIncorrect)
        ));
        // Budget exhausted: even the correct code is rejected.
        assert!(matches!(
            service.verify("user@example.com", &code, "10.0.0.9"),
            VerifyOutcome::Rejected(OtpRejection::RateLimited)
        ));
        // A different source address is unaffected.
        assert!(matches!(
            service.verify("user@example.com", &code, "10.0.0.10"),
            VerifyOutcome::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn repeated_code_requests_are_throttled_per_source() {
        let limiter = RateLimiter::new(MemoryRateLimitStore::new(), 2, Duration::minutes(15));
        let service = OtpService::with_limiter(StubSender::default(), limiter);

        service.request_code("user@example.com", "10.0.0.9").await.expect("request failed");
        service.request_code("user@example.com", "10.0.0.9").await.expect("request failed");
        assert!(matches!(
            service.request_code("user@example.com", "10.0.0.9").await,
            Err(OtpRequestError::RateLimited)
        ));
        // Only the permitted requests reached the sender.
        assert_eq!(service.sender.sent.lock().expect("lock poisoned").len(), 2);

        // Request throttling does not consume the verification budget.
        let code = service.sender.last_code().expect("no code delivered");
        assert!(matches!(
            service.verify("user@example.com", &code, "10.0.0.9"),
            VerifyOutcome::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn malformed_email_never_reaches_the_sender() {
        let service = OtpService::new(StubSender::default());

        assert!(matches!(
            service.request_code("not-an-email", "10.0.0.1").await,
            Err(OtpRequestError::InvalidEmail)
        ));
        assert!(matches!(
            service.request_code("user@nodot", "10.0.0.1").await,
            Err(OtpRequestError::InvalidEmail)
        ));
        assert!(service.sender.sent.lock().expect("lock poisoned").is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_leaves_no_pending_code() {
        let service = OtpService::new(StubSender::default());
        service.sender.fail.store(true, Ordering::SeqCst);

        assert!(matches!(
            service.request_code("user@example.com", "10.0.0.1").await,
            Err(OtpRequestError::DeliveryFailed(_))
        ));
        assert!(matches!(
            service.verify("user@example.com", "123456", "10.0.0.1"),
            VerifyOutcome::Rejected(OtpRejection::NoPendingCode)
        ));
    }

    #[test]
    fn generated_codes_are_numeric() {
        // Spot-check the code generator through the plausible-email path.
        assert!(is_plausible_email("a@b.co"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a@"));
    }
}

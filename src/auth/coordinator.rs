//! Credential coordination for all outbound API calls.
//!
//! The `AuthCoordinator` owns the bearer-token/tenant pair used by every
//! request. It serializes refresh attempts so that several in-flight
//! requests hitting a 401 at the same time collapse into a single
//! identity-provider call, and it broadcasts credential changes to
//! subscribers (cache invalidation, UI gating).
//!
//! Tokens live only in memory. Nothing here is written to disk.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// Minimum interval between upstream refresh calls, in seconds.
/// Near-simultaneous 401s from independent requests must collapse into
/// one identity-provider hit.
const REFRESH_DEBOUNCE_SECS: u64 = 10;

// ============================================================================
// Types
// ============================================================================

/// Bearer token plus the tenant it is scoped to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Opaque bearer token issued by the identity provider.
    pub token: String,
    /// Organization/workspace all requests are scoped to.
    pub tenant_id: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

// Tokens must not leak into logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no usable credential - sign in required")]
    NotAuthenticated,

    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),
}

/// Upstream seam for token issuance.
///
/// The production implementation calls the hosted identity provider; tests
/// substitute stubs to observe call counts and inject failures.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange whatever the provider persists (an HTTP-only session
    /// cookie, a refresh grant) for a fresh credential pair.
    async fn refresh_credential(&self) -> anyhow::Result<Credential>;
}

// ============================================================================
// Subscriptions
// ============================================================================

type SubscriberFn = Box<dyn Fn(Option<&Credential>) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: SubscriberFn,
}

type SubscriberList = Arc<StdMutex<Vec<Arc<Subscriber>>>>;

/// Guard returned by [`AuthCoordinator::subscribe`]. Dropping it removes
/// the listener.
pub struct Subscription {
    subscribers: SubscriberList,
    id: u64,
}

impl Subscription {
    /// Explicitly remove the listener. Equivalent to dropping the guard.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subs.retain(|s| s.id != self.id);
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Tracks the outcome of the most recent refresh attempt so the debounce
/// window can short-circuit to it.
struct RefreshGate {
    last_attempt: Option<Instant>,
    last_succeeded: bool,
}

/// Owns the credential pair and serializes refreshes.
///
/// Construct once per process and share via `Arc`. The identity provider
/// is injected rather than reached through a global, so tests and
/// alternate deployments can swap it.
pub struct AuthCoordinator {
    provider: Arc<dyn IdentityProvider>,
    credential: StdMutex<Option<Credential>>,
    /// Held across the upstream await; overlapping callers queue here and
    /// then observe the winner's outcome through the debounce window.
    refresh_gate: Mutex<RefreshGate>,
    ready_tx: watch::Sender<bool>,
    subscribers: SubscriberList,
    next_subscriber_id: AtomicU64,
}

impl AuthCoordinator {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            provider,
            credential: StdMutex::new(None),
            refresh_gate: Mutex::new(RefreshGate {
                last_attempt: None,
                last_succeeded: false,
            }),
            ready_tx,
            subscribers: Arc::new(StdMutex::new(Vec::new())),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Install a new credential pair.
    ///
    /// Subscribers are notified only when the pair actually changed
    /// (token or tenant); re-installing an identical credential is a
    /// no-op for listeners. The first install arms the ready signal.
    pub fn install(&self, credential: Credential) {
        let changed = {
            let mut slot = self
                .credential
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let changed = slot.as_ref() != Some(&credential);
            *slot = Some(credential.clone());
            changed
        };
        if changed {
            debug!(tenant = %credential.tenant_id, "credential installed");
            self.notify(Some(&credential));
        }
        // watch dedupes repeat sends, so this fires ready exactly once
        // per armed period.
        self.ready_tx.send_replace(true);
    }

    /// Snapshot of the current credential, possibly stale. Never blocks.
    pub fn credential(&self) -> Option<Credential> {
        self.credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Discard the credential and disarm the ready signal so a later
    /// sign-in re-fires it. Subscribers see an empty credential.
    pub fn clear(&self) {
        let had_credential = {
            let mut slot = self
                .credential
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take().is_some()
        };
        self.ready_tx.send_replace(false);
        if had_credential {
            debug!("credential cleared");
            self.notify(None);
        }
    }

    /// Request a fresh credential from the identity provider.
    ///
    /// At most one upstream call is in flight at a time; concurrent
    /// callers queue and then observe the winner's outcome. A second call
    /// within the debounce window returns the prior outcome without
    /// another upstream hit. On failure the previous (possibly expired)
    /// token is left untouched and no usable credential is reported.
    pub async fn refresh(&self) -> Result<Credential, AuthError> {
        let mut gate = self.refresh_gate.lock().await;

        if let Some(at) = gate.last_attempt {
            if at.elapsed() < Duration::from_secs(REFRESH_DEBOUNCE_SECS) {
                return if gate.last_succeeded {
                    self.credential().ok_or(AuthError::NotAuthenticated)
                } else {
                    Err(AuthError::NotAuthenticated)
                };
            }
        }

        gate.last_attempt = Some(Instant::now());
        match self.provider.refresh_credential().await {
            Ok(credential) => {
                gate.last_succeeded = true;
                self.install(credential.clone());
                debug!(tenant = %credential.tenant_id, "credential refreshed");
                Ok(credential)
            }
            Err(err) => {
                gate.last_succeeded = false;
                warn!(error = %format!("{err:#}"), "credential refresh failed; keeping previous token");
                Err(AuthError::RefreshFailed(format!("{err:#}")))
            }
        }
    }

    /// Register a listener invoked on every credential change. The
    /// returned guard unsubscribes on drop.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&Credential>) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut subs = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subs.push(Arc::new(Subscriber {
                id,
                callback: Box::new(callback),
            }));
        }
        Subscription {
            subscribers: Arc::clone(&self.subscribers),
            id,
        }
    }

    /// Resolve `true` once a credential has been installed, or `false`
    /// if the timeout elapses first. A zero timeout is a readiness poll.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.ready_tx.subscribe();
        // wait_for yields a guard borrowing rx; bind the outcome so the
        // guard is dropped before rx goes out of scope.
        let ready = match tokio::time::timeout(timeout, rx.wait_for(|ready| *ready)).await {
            Ok(result) => result.is_ok(),
            Err(_elapsed) => false,
        };
        ready
    }

    /// Invoke every subscriber, isolating panics so one failing listener
    /// cannot block the rest.
    fn notify(&self, credential: Option<&Credential>) {
        let entries: Vec<Arc<Subscriber>> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for sub in entries {
            let outcome = catch_unwind(AssertUnwindSafe(|| (sub.callback)(credential)));
            if outcome.is_err() {
                warn!(subscriber_id = sub.id, "credential subscriber panicked; continuing");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    /// Identity provider stub that counts upstream calls and can be
    /// switched into a failing mode.
    struct StubProvider {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay_ms: u64,
    }

    impl StubProvider {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay_ms,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityProvider for StubProvider {
        async fn refresh_credential(&self) -> anyhow::Result<Credential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("identity provider unavailable");
            }
            Ok(Credential::new(format!("token-{}", n), "tenant-a"))
        }
    }

    #[tokio::test]
    async fn concurrent_refreshes_make_one_upstream_call() {
        let provider = StubProvider::new(50);
        let coordinator = Arc::new(AuthCoordinator::new(provider.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&coordinator);
                tokio::spawn(async move { c.refresh().await })
            })
            .collect();

        let mut tokens = Vec::new();
        for task in tasks {
            let credential = task.await.expect("task panicked").expect("refresh failed");
            tokens.push(credential.token);
        }

        assert_eq!(provider.calls(), 1);
        assert!(tokens.iter().all(|t| t == "token-1"));
    }

    #[tokio::test]
    async fn refresh_within_debounce_window_reuses_token() {
        let provider = StubProvider::new(0);
        let coordinator = AuthCoordinator::new(provider.clone());

        let first = coordinator.refresh().await.expect("refresh failed");
        let second = coordinator.refresh().await.expect("refresh failed");

        assert_eq!(provider.calls(), 1);
        assert_eq!(first.token, second.token);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_token() {
        let provider = StubProvider::new(0);
        let coordinator = AuthCoordinator::new(provider.clone());
        coordinator.install(Credential::new("expired-token", "tenant-a"));

        provider.fail.store(true, Ordering::SeqCst);
        let result = coordinator.refresh().await;

        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
        let current = coordinator.credential().expect("credential missing");
        assert_eq!(current.token, "expired-token");
    }

    #[tokio::test]
    async fn concurrent_refreshes_observe_same_failure() {
        let provider = StubProvider::new(50);
        provider.fail.store(true, Ordering::SeqCst);
        let coordinator = Arc::new(AuthCoordinator::new(provider.clone()));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&coordinator);
                tokio::spawn(async move { c.refresh().await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.expect("task panicked").is_err());
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn install_identical_credential_does_not_renotify() {
        let coordinator = AuthCoordinator::new(StubProvider::new(0));
        let notifications = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&notifications);
        let _subscription = coordinator.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.install(Credential::new("tok", "tenant-a"));
        coordinator.install(Credential::new("tok", "tenant-a"));
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        coordinator.install(Credential::new("tok2", "tenant-a"));
        assert_eq!(notifications.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_notifies_empty_and_rearms_ready() {
        let coordinator = AuthCoordinator::new(StubProvider::new(0));
        let cleared = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&cleared);
        let _subscription = coordinator.subscribe(move |credential| {
            if credential.is_none() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        coordinator.install(Credential::new("tok", "tenant-a"));
        assert!(coordinator.wait_until_ready(Duration::ZERO).await);

        coordinator.clear();
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
        assert!(coordinator.credential().is_none());
        assert!(!coordinator.wait_until_ready(Duration::from_millis(10)).await);

        // A later sign-in fires the one-time signal again.
        coordinator.install(Credential::new("tok2", "tenant-a"));
        assert!(coordinator.wait_until_ready(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn wait_until_ready_resolves_when_credential_arrives() {
        let coordinator = Arc::new(AuthCoordinator::new(StubProvider::new(0)));

        assert!(!coordinator.wait_until_ready(Duration::from_millis(20)).await);

        let installer = Arc::clone(&coordinator);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            installer.install(Credential::new("tok", "tenant-a"));
        });
        assert!(coordinator.wait_until_ready(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn dropped_subscription_stops_notifications() {
        let coordinator = AuthCoordinator::new(StubProvider::new(0));
        let notifications = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&notifications);
        let subscription = coordinator.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.install(Credential::new("tok", "tenant-a"));
        subscription.cancel();
        coordinator.install(Credential::new("tok2", "tenant-a"));

        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_block_others() {
        let coordinator = AuthCoordinator::new(StubProvider::new(0));
        let notifications = Arc::new(AtomicUsize::new(0));

        let _bad = coordinator.subscribe(|_| panic!("listener bug"));
        let seen = Arc::clone(&notifications);
        let _good = coordinator.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.install(Credential::new("tok", "tenant-a"));
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn credential_debug_redacts_token() {
        let credential = Credential::new("super-secret", "tenant-a");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("tenant-a"));
    }
}

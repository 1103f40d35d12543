//! Per-client auth state machine.
//!
//! ARCHITECTURE
//! ============
//! `AuthSession` is a cheap `Clone` handle created once at the application
//! root and passed to whatever needs auth state. Observers either poll
//! [`AuthSession::snapshot`] or [`AuthSession::subscribe`] to a `watch`
//! channel.
//!
//! ```text
//! Uninitialized -> Loading -> Authenticated | Unauthenticated
//! Authenticated -> Loading (refresh) | Unauthenticated (logout, rejected refresh)
//! Unauthenticated -> Loading (login)
//! ```
//!
//! CONCURRENCY
//! ===========
//! Initialize and refresh share a single in-flight slot: a caller arriving
//! while one is pending awaits the same `Shared` future instead of issuing
//! another fetch. Every login, logout and teardown bumps a generation
//! counter; an operation only commits if the generation it started under is
//! still current. The check and the commit happen under the same lock as the
//! bump, so a late response can never overwrite a newer sign-out.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;

use crate::error::AuthError;
use crate::identity::{Credentials, SessionToken, UserIdentity};
use crate::provider::{IdentityProvider, LoginGrant, OAuthProvider};
use crate::role::RoleSet;
use crate::token_store::TokenStore;

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    Uninitialized,
    Loading,
    Authenticated { user: UserIdentity, token: SessionToken },
    Unauthenticated,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub status: AuthStatus,
    /// Last surfaced failure, e.g. rejected credentials. Cleared on success.
    pub error: Option<AuthError>,
}

impl AuthSnapshot {
    fn new(status: AuthStatus) -> Self {
        Self { status, error: None }
    }

    /// True until the first initialize/refresh/login has settled.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self.status, AuthStatus::Uninitialized | AuthStatus::Loading)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.status, AuthStatus::Authenticated { .. })
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserIdentity> {
        match &self.status {
            AuthStatus::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&SessionToken> {
        match &self.status {
            AuthStatus::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Roles of the current user. Empty unless authenticated.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        self.user().map(|u| u.roles.clone()).unwrap_or_default()
    }
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self::new(AuthStatus::Uninitialized)
    }
}

// =============================================================================
// RETRY POLICY
// =============================================================================

/// Bounded exponential backoff applied to transport failures during refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. `1` disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn none() -> Self {
        Self { max_attempts: 1, base_delay: Duration::ZERO, max_delay: Duration::ZERO }
    }

    /// Delay before attempt `attempt + 1`, doubling from `base_delay`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(250), max_delay: Duration::from_secs(2) }
    }
}

// =============================================================================
// SESSION
// =============================================================================

type SharedOp = Shared<BoxFuture<'static, AuthSnapshot>>;

struct Inflight {
    generation: u64,
    op: SharedOp,
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn TokenStore>,
    retry: RetryPolicy,
    state: watch::Sender<AuthSnapshot>,
    generation: AtomicU64,
    initialized: AtomicBool,
    closed: AtomicBool,
    /// Guards the in-flight slot and serializes every state commit.
    pending: Mutex<Option<Inflight>>,
}

enum Op {
    Initialize { token: SessionToken },
    Refresh { token: SessionToken, previous: Option<UserIdentity> },
}

/// What a settled operation wants to commit.
struct Outcome {
    status: AuthStatus,
    error: Option<AuthError>,
    clear_token: bool,
}

/// Shared handle to one client's auth state.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<Inner>,
}

impl AuthSession {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn TokenStore>) -> Self {
        Self::with_retry_policy(provider, store, RetryPolicy::default())
    }

    #[must_use]
    pub fn with_retry_policy(provider: Arc<dyn IdentityProvider>, store: Arc<dyn TokenStore>, retry: RetryPolicy) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                retry,
                state,
                generation: AtomicU64::new(0),
                initialized: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                pending: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.state.subscribe()
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Restore the session from the token store. Only the first call does work;
    /// later calls join a pending operation or return the current snapshot.
    pub async fn initialize(&self) -> AuthSnapshot {
        let op = {
            let mut slot = self.lock_pending();
            if self.is_closed() {
                return self.snapshot();
            }
            if self.inner.initialized.swap(true, Ordering::SeqCst) {
                match self.joinable(&slot) {
                    Some(op) => op,
                    None => return self.snapshot(),
                }
            } else {
                match self.inner.store.load().and_then(SessionToken::new) {
                    Some(token) => self.start(&mut slot, Op::Initialize { token }),
                    None => {
                        tracing::debug!("no stored session token");
                        self.publish(AuthSnapshot::new(AuthStatus::Unauthenticated));
                        return self.snapshot();
                    }
                }
            }
        };
        op.await
    }

    /// Re-fetch the current user without touching the token.
    pub async fn refresh_user_data(&self) -> AuthSnapshot {
        let op = {
            let mut slot = self.lock_pending();
            if self.is_closed() {
                return self.snapshot();
            }
            if let Some(op) = self.joinable(&slot) {
                op
            } else {
                let current = self.snapshot();
                let previous = current.user().cloned();
                let token = current
                    .token()
                    .cloned()
                    .or_else(|| self.inner.store.load().and_then(SessionToken::new));
                let Some(token) = token else {
                    self.publish(AuthSnapshot::new(AuthStatus::Unauthenticated));
                    return self.snapshot();
                };
                self.inner.initialized.store(true, Ordering::SeqCst);
                self.start(&mut slot, Op::Refresh { token, previous })
            }
        };
        op.await
    }

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns the provider's error (`CredentialsInvalid` for a rejected
    /// password) and records it on the snapshot. The token store is left
    /// untouched on failure. Returns `Superseded` if a logout or another
    /// login landed first.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError> {
        let generation = self.begin_exclusive()?;
        tracing::info!(email = %credentials.email, "login attempt");
        let result = self.inner.provider.exchange_credentials(credentials).await;
        self.finish_exclusive(generation, result)
    }

    /// Start the Google redirect flow, returning the URL to navigate to.
    ///
    /// The result arrives out of band; call [`AuthSession::complete_oauth_login`]
    /// once the redirect lands.
    #[must_use]
    pub fn login_with_google(&self, return_to: &str) -> String {
        tracing::info!(provider = %OAuthProvider::Google, return_to, "starting oauth sign-in");
        self.inner.provider.authorize_url(OAuthProvider::Google, return_to)
    }

    /// Re-run initialization after an OAuth redirect.
    ///
    /// `token` is the session token handed back by the redirect, if any. It is
    /// persisted best-effort and used directly, so sign-in still works where
    /// the store is unavailable.
    pub async fn complete_oauth_login(&self, token: Option<&str>) -> AuthSnapshot {
        let op = {
            let mut slot = self.lock_pending();
            if self.is_closed() {
                return self.snapshot();
            }
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            *slot = None;
            self.inner.initialized.store(true, Ordering::SeqCst);

            let token = token.and_then(SessionToken::new);
            if let Some(token) = &token {
                self.persist(token);
            }
            match token.or_else(|| self.inner.store.load().and_then(SessionToken::new)) {
                Some(token) => self.start(&mut slot, Op::Initialize { token }),
                None => {
                    self.publish(AuthSnapshot::new(AuthStatus::Unauthenticated));
                    return self.snapshot();
                }
            }
        };
        op.await
    }

    /// Drop the session locally. Never waits on the network; server-side
    /// revocation is spawned in the background when a runtime is available.
    pub fn logout(&self) -> AuthSnapshot {
        if let Some(token) = self.end_local_session() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let provider = Arc::clone(&self.inner.provider);
                handle.spawn(async move { provider.revoke(&token).await });
            }
        }
        self.snapshot()
    }

    /// Like [`AuthSession::logout`], but waits for the provider to revoke the
    /// token. For short-lived callers whose runtime would drop a spawned task.
    pub async fn logout_and_revoke(&self) -> AuthSnapshot {
        if let Some(token) = self.end_local_session() {
            self.inner.provider.revoke(&token).await;
        }
        self.snapshot()
    }

    /// Clear the token and publish `Unauthenticated`, returning the token
    /// that was in use, if any.
    fn end_local_session(&self) -> Option<SessionToken> {
        let mut slot = self.lock_pending();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *slot = None;
        let token = self
            .snapshot()
            .token()
            .cloned()
            .or_else(|| self.inner.store.load().and_then(SessionToken::new));
        self.inner.store.clear();
        self.inner.initialized.store(true, Ordering::SeqCst);
        self.publish(AuthSnapshot::new(AuthStatus::Unauthenticated));
        if let Some(token) = &token {
            tracing::info!(token = %token.fingerprint(), "logged out");
        }
        token
    }

    /// Stop all pending work from touching state. Used when the owner of the
    /// session goes away mid-operation.
    pub fn teardown(&self) {
        let mut slot = self.lock_pending();
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *slot = None;
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn lock_pending(&self) -> MutexGuard<'_, Option<Inflight>> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn publish(&self, snapshot: AuthSnapshot) {
        self.inner.state.send_replace(snapshot);
    }

    fn persist(&self, token: &SessionToken) {
        if let Err(e) = self.inner.store.save(token.expose()) {
            tracing::warn!(error = %e, "session token not persisted; continuing in memory");
        }
    }

    fn joinable(&self, slot: &Option<Inflight>) -> Option<SharedOp> {
        slot.as_ref()
            .filter(|inflight| inflight.generation == self.current_generation())
            .map(|inflight| inflight.op.clone())
    }

    /// Publish `Loading` and park a shared operation in the slot.
    fn start(&self, slot: &mut Option<Inflight>, op: Op) -> SharedOp {
        let generation = self.current_generation();
        self.publish(AuthSnapshot::new(AuthStatus::Loading));

        let weak = Arc::downgrade(&self.inner);
        let shared = run_op(weak, generation, op).boxed().shared();
        *slot = Some(Inflight { generation, op: shared.clone() });
        shared
    }

    /// Commit `outcome` if `generation` is still current. Always vacates the
    /// in-flight slot that belongs to `generation`.
    fn commit(&self, generation: u64, outcome: Outcome) -> bool {
        let mut slot = self.lock_pending();
        if slot.as_ref().is_some_and(|inflight| inflight.generation == generation) {
            *slot = None;
        }
        if self.is_closed() || generation != self.current_generation() {
            tracing::debug!(generation, "discarding stale auth result");
            return false;
        }
        if outcome.clear_token {
            self.inner.store.clear();
        }
        self.publish(AuthSnapshot { status: outcome.status, error: outcome.error });
        true
    }

    fn begin_exclusive(&self) -> Result<u64, AuthError> {
        let mut slot = self.lock_pending();
        if self.is_closed() {
            return Err(AuthError::Superseded);
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = None;
        self.inner.initialized.store(true, Ordering::SeqCst);
        self.publish(AuthSnapshot::new(AuthStatus::Loading));
        Ok(generation)
    }

    fn finish_exclusive(
        &self,
        generation: u64,
        result: Result<LoginGrant, AuthError>,
    ) -> Result<UserIdentity, AuthError> {
        let mut slot = self.lock_pending();
        if self.is_closed() || generation != self.current_generation() {
            tracing::debug!(generation, "discarding stale login result");
            return Err(AuthError::Superseded);
        }
        // Anything started while the exchange was pending read the old token.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *slot = None;
        match result {
            Ok(grant) => {
                self.persist(&grant.token);
                tracing::info!(user_id = %grant.user.id, roles = %grant.user.roles, token = %grant.token.fingerprint(), "login succeeded");
                let user = grant.user.clone();
                self.publish(AuthSnapshot::new(AuthStatus::Authenticated { user: grant.user, token: grant.token }));
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "login failed");
                self.publish(AuthSnapshot { status: AuthStatus::Unauthenticated, error: Some(e.clone()) });
                Err(e)
            }
        }
    }

    async fn fetch_with_retry(&self, generation: u64, token: &SessionToken, policy: RetryPolicy) -> Result<UserIdentity, AuthError> {
        let mut attempt = 1;
        loop {
            match self.inner.provider.fetch_user(token).await {
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.delay_after(attempt);
                    tracing::warn!(error = %e, attempt, delay = ?delay, "identity fetch failed; retrying");
                    tokio::time::sleep(delay).await;
                    if generation != self.current_generation() {
                        return Err(AuthError::Superseded);
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

async fn run_op(weak: Weak<Inner>, generation: u64, op: Op) -> AuthSnapshot {
    let Some(inner) = weak.upgrade() else {
        return AuthSnapshot::new(AuthStatus::Unauthenticated);
    };
    let session = AuthSession { inner };

    let outcome = match op {
        Op::Initialize { token } => match session.fetch_with_retry(generation, &token, RetryPolicy::none()).await {
            Ok(user) => Outcome { status: AuthStatus::Authenticated { user, token }, error: None, clear_token: false },
            Err(e) => {
                tracing::info!(error = %e, token = %token.fingerprint(), "stored session rejected");
                Outcome { status: AuthStatus::Unauthenticated, error: None, clear_token: true }
            }
        },
        Op::Refresh { token, previous } => {
            let retry = session.inner.retry;
            match session.fetch_with_retry(generation, &token, retry).await {
                Ok(user) => Outcome { status: AuthStatus::Authenticated { user, token }, error: None, clear_token: false },
                Err(e) if e.is_authoritative() => {
                    tracing::info!(error = %e, token = %token.fingerprint(), "session ended by provider");
                    Outcome { status: AuthStatus::Unauthenticated, error: None, clear_token: true }
                }
                Err(e) => match previous {
                    Some(user) => {
                        tracing::warn!(error = %e, user_id = %user.id, "refresh failed; keeping last known user");
                        Outcome { status: AuthStatus::Authenticated { user, token }, error: Some(e), clear_token: false }
                    }
                    None => {
                        tracing::warn!(error = %e, "refresh failed with no prior session");
                        Outcome { status: AuthStatus::Unauthenticated, error: Some(e), clear_token: false }
                    }
                },
            }
        }
    };

    session.commit(generation, outcome);
    session.snapshot()
}

//! Single-flight token refresh.
//!
//! `RefreshCoordinator` owns the process-wide refresh state. At most one
//! network refresh exists at a time; every caller that asks for a refresh
//! while one is pending joins it and receives a clone of the same outcome.
//!
//! The refresh itself runs on its own tokio task. Callers hold a
//! [`Shared`] handle to that task, so dropping every caller does not cancel
//! the refresh, and a panic inside it settles the state instead of leaving a
//! refresh stuck in flight.
//!
//! # Generations
//!
//! Every `clear_tokens` and `store_session` starts a new session generation.
//! A refresh only writes its result back if the generation it started in is
//! still current; otherwise its waiters get whatever the newer session holds
//! (or `SessionCleared` when signed out).
//!
//! Starting a generation drops the pending handle but not the task: its
//! network call keeps running until it settles. A `refresh_token` in the new
//! generation therefore starts its own network refresh alongside the old
//! one, so two refresh requests can briefly be in flight across a sign-in or
//! sign-out. Only the new one can write tokens back.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use learnhub_core::Result;
use tracing::{debug, info, instrument, warn};

use crate::claims::AccessClaims;
use crate::credentials::{AccessToken, CredentialStore, TokenPair};
use crate::endpoints::{RefreshedTokens, TokenEndpoint};
use crate::error::{RefreshError, StorageError};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default first backoff delay.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default proactive refresh window.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

/// Retry schedule for refresh attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay: Duration,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BACKOFF_BASE,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }
}

type PendingRefresh = Shared<BoxFuture<'static, std::result::Result<AccessToken, RefreshError>>>;

#[derive(Default)]
struct RefreshState {
    pending: Option<PendingRefresh>,
    attempt: u32,
    generation: u64,
}

struct Inner {
    endpoint: Arc<dyn TokenEndpoint>,
    credentials: CredentialStore,
    policy: RetryPolicy,
    refresh_threshold: Duration,
    state: Mutex<RefreshState>,
}

/// Coordinates token refreshes and owns credential writes.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    /// Creates a coordinator with the default retry policy and threshold.
    #[must_use]
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, credentials: CredentialStore) -> Self {
        Self::with_policy(
            endpoint,
            credentials,
            RetryPolicy::default(),
            DEFAULT_REFRESH_THRESHOLD,
        )
    }

    /// Creates a coordinator with an explicit retry policy and proactive
    /// refresh window.
    #[must_use]
    pub fn with_policy(
        endpoint: Arc<dyn TokenEndpoint>,
        credentials: CredentialStore,
        policy: RetryPolicy,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                credentials,
                policy,
                refresh_threshold,
                state: Mutex::new(RefreshState::default()),
            }),
        }
    }

    /// Returns the credential store.
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// Starts a refresh, or joins the one in flight.
    ///
    /// Resolves with the new access token once it has been written to both
    /// credential stores.
    ///
    /// # Errors
    ///
    /// Returns `NoRefreshToken` without any network call when no refresh
    /// token is stored, the last attempt's error once retries are exhausted,
    /// or `SessionCleared` if the session was cleared meanwhile. Credentials
    /// are never cleared here.
    pub async fn refresh_token(&self) -> std::result::Result<AccessToken, RefreshError> {
        self.start_or_join().await
    }

    /// Joins the refresh in flight, or starts one.
    ///
    /// Used by request recovery; equivalent to [`Self::refresh_token`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::refresh_token`].
    pub async fn wait_for_refresh(&self) -> std::result::Result<AccessToken, RefreshError> {
        if self.is_refreshing() {
            debug!("joining in-flight refresh");
        }
        self.start_or_join().await
    }

    fn start_or_join(&self) -> PendingRefresh {
        let mut state = self.inner.lock_state();
        if let Some(pending) = &state.pending {
            return pending.clone();
        }

        state.attempt = 0;
        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(inner.run_refresh(generation));
        let pending = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(RefreshError::Interrupted {
                    details: e.to_string(),
                }),
            }
        }
        .boxed()
        .shared();
        state.pending = Some(pending.clone());
        pending
    }

    /// Returns true while a refresh is in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_state().pending.is_some()
    }

    /// Returns the attempt counter of the current or most recent refresh.
    #[must_use]
    pub fn retry_attempt(&self) -> u32 {
        self.inner.lock_state().attempt
    }

    /// Returns the stored access token.
    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.inner.credentials.access_token().map(AccessToken::new)
    }

    fn claims(&self) -> Option<AccessClaims> {
        self.inner
            .credentials
            .access_token()
            .and_then(|token| AccessClaims::read(&token))
    }

    /// Returns true when a decodable access token expires within the
    /// refresh window.
    #[must_use]
    pub fn should_refresh_token(&self) -> bool {
        self.should_refresh_token_at(Utc::now())
    }

    /// [`Self::should_refresh_token`] evaluated at `now`.
    #[must_use]
    pub fn should_refresh_token_at(&self, now: DateTime<Utc>) -> bool {
        let threshold = i64::try_from(self.inner.refresh_threshold.as_secs()).unwrap_or(i64::MAX);
        self.claims()
            .is_some_and(|claims| claims.seconds_remaining(now) < threshold)
    }

    /// Returns true when a decodable access token has not yet expired.
    #[must_use]
    pub fn is_token_valid(&self) -> bool {
        self.is_token_valid_at(Utc::now())
    }

    /// [`Self::is_token_valid`] evaluated at `now`.
    #[must_use]
    pub fn is_token_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.claims().is_some_and(|claims| claims.is_valid_at(now))
    }

    /// Seconds until the access token expires, floored at zero.
    ///
    /// `None` when there is no decodable token.
    #[must_use]
    pub fn time_until_expiry(&self) -> Option<u64> {
        self.time_until_expiry_at(Utc::now())
    }

    /// [`Self::time_until_expiry`] evaluated at `now`.
    #[must_use]
    pub fn time_until_expiry_at(&self, now: DateTime<Utc>) -> Option<u64> {
        self.claims()
            .map(|claims| u64::try_from(claims.seconds_remaining(now)).unwrap_or(0))
    }

    /// Stores a freshly issued session (after login).
    ///
    /// Any refresh still in flight belongs to the previous session and will
    /// not overwrite these tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store rejects the write.
    pub fn store_session(&self, pair: &TokenPair) -> Result<(), StorageError> {
        let mut state = self.inner.lock_state();
        state.generation += 1;
        state.pending = None;
        state.attempt = 0;
        self.inner.credentials.store(pair)?;
        info!(generation = state.generation, "session stored");
        Ok(())
    }

    /// Clears both credential stores and resets refresh state.
    ///
    /// Waiters of a refresh still in flight receive `SessionCleared`.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store could not be cleared. The
    /// cookies and refresh state are cleared regardless.
    pub fn clear_tokens(&self) -> Result<(), StorageError> {
        let mut state = self.inner.lock_state();
        state.generation += 1;
        state.pending = None;
        state.attempt = 0;
        self.inner.credentials.clear()?;
        info!(generation = state.generation, "session cleared");
        Ok(())
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[instrument(skip(self))]
    async fn run_refresh(
        self: Arc<Self>,
        generation: u64,
    ) -> std::result::Result<AccessToken, RefreshError> {
        let _settle = Settle {
            inner: &self,
            generation,
        };

        let Some(refresh_token) = self.credentials.refresh_token() else {
            debug!("no refresh token stored");
            return Err(RefreshError::NoRefreshToken);
        };

        let mut attempt = 0;
        loop {
            if !self.record_attempt(generation, attempt) {
                return self.superseded();
            }

            let outcome = match tokio::time::timeout(
                self.policy.attempt_timeout,
                self.endpoint.refresh(&refresh_token),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(RefreshError::Timeout {
                    after_ms: u64::try_from(self.policy.attempt_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                }),
            };

            match outcome {
                Ok(tokens) => return self.commit(generation, tokens),
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "refresh attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "refresh failed");
                    return Err(err);
                }
            }
        }
    }

    /// Records the attempt number; false once the session has moved on.
    fn record_attempt(&self, generation: u64, attempt: u32) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation {
            return false;
        }
        state.attempt = attempt;
        debug!(attempt, "refresh attempt");
        true
    }

    fn commit(
        &self,
        generation: u64,
        tokens: RefreshedTokens,
    ) -> std::result::Result<AccessToken, RefreshError> {
        let mut state = self.lock_state();
        if state.generation != generation {
            drop(state);
            debug!("discarding refresh result from a previous session");
            return self.superseded();
        }

        let pair = TokenPair::new(tokens.access, tokens.refresh);
        self.credentials
            .store(&pair)
            .map_err(|e| RefreshError::Storage {
                details: e.to_string(),
            })?;
        state.attempt = 0;
        info!(rotated = pair.refresh.is_some(), "access token refreshed");
        Ok(AccessToken::new(pair.access))
    }

    fn superseded(&self) -> std::result::Result<AccessToken, RefreshError> {
        self.credentials
            .access_token()
            .map(AccessToken::new)
            .ok_or(RefreshError::SessionCleared)
    }
}

/// Clears the pending slot when a refresh task ends, however it ends.
struct Settle<'a> {
    inner: &'a Inner,
    generation: u64,
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        if state.generation == self.generation {
            state.pending = None;
        }
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("RefreshCoordinator")
            .field("policy", &self.inner.policy)
            .field("refreshing", &state.pending.is_some())
            .field("attempt", &state.attempt)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::{ACCESS_TOKEN_COOKIE, CookiePolicy, REFRESH_TOKEN_COOKIE};
    use crate::role::Role;
    use async_trait::async_trait;
    use learnhub_core::UserId;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Step = (Duration, std::result::Result<RefreshedTokens, RefreshError>);

    /// Endpoint that plays back a script, then repeats a fallback step.
    struct ScriptedEndpoint {
        calls: AtomicUsize,
        script: Mutex<VecDeque<Step>>,
        fallback: Step,
    }

    impl ScriptedEndpoint {
        fn new(script: Vec<Step>, fallback: Step) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                fallback,
            })
        }

        fn always(step: Step) -> Arc<Self> {
            Self::new(Vec::new(), step)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenEndpoint for ScriptedEndpoint {
        async fn refresh(
            &self,
            _refresh_token: &str,
        ) -> std::result::Result<RefreshedTokens, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, outcome) = self
                .script
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            tokio::time::sleep(delay).await;
            outcome
        }
    }

    fn token_expiring_at(exp: i64) -> String {
        AccessClaims {
            user_id: UserId::new(7),
            email: "s@example.com".to_string(),
            role: Role::Student,
            name: None,
            issued_at: None,
            expires_at: exp,
        }
        .to_unsigned_token()
    }

    fn token_expiring_in(secs: i64) -> String {
        token_expiring_at(Utc::now().timestamp() + secs)
    }

    fn ok(access: &str, refresh: Option<&str>) -> std::result::Result<RefreshedTokens, RefreshError> {
        Ok(RefreshedTokens {
            access: access.to_string(),
            refresh: refresh.map(str::to_string),
        })
    }

    fn server_error() -> std::result::Result<RefreshedTokens, RefreshError> {
        Err(RefreshError::Server { status: 502 })
    }

    fn signed_in(endpoint: Arc<ScriptedEndpoint>) -> RefreshCoordinator {
        let coordinator =
            RefreshCoordinator::new(endpoint, CredentialStore::in_memory(CookiePolicy::default()));
        coordinator
            .store_session(&TokenPair::new(
                token_expiring_in(60),
                Some("r-1".to_string()),
            ))
            .expect("store session");
        coordinator
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_refresh() {
        let endpoint = ScriptedEndpoint::always((Duration::from_millis(100), ok("a-2", None)));
        let coordinator = signed_in(Arc::clone(&endpoint));

        let callers: Vec<_> = (0..8).map(|_| coordinator.refresh_token()).collect();
        let outcomes = futures::future::join_all(callers).await;

        assert_eq!(endpoint.calls(), 1);
        for outcome in &outcomes {
            assert_eq!(outcome, &Ok(AccessToken::new("a-2")));
        }
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_failure() {
        let endpoint = ScriptedEndpoint::always((Duration::ZERO, server_error()));
        let coordinator = signed_in(Arc::clone(&endpoint));

        let first = coordinator.refresh_token();
        let second = coordinator.wait_for_refresh();
        let (first, second) = futures::future::join(first, second).await;

        assert_eq!(first, Err(RefreshError::Server { status: 502 }));
        assert_eq!(first, second);
        assert_eq!(endpoint.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_exponential_backoff_then_rejects() {
        let endpoint = ScriptedEndpoint::always((Duration::ZERO, server_error()));
        let coordinator = signed_in(Arc::clone(&endpoint));
        let started = tokio::time::Instant::now();

        let outcome = coordinator.refresh_token().await;

        assert_eq!(outcome, Err(RefreshError::Server { status: 502 }));
        assert_eq!(endpoint.calls(), 4);
        assert!(started.elapsed() >= Duration::from_secs(7));
        assert_eq!(coordinator.retry_attempt(), 3);
        // Failure never signs the user out.
        assert_eq!(coordinator.credentials().refresh_token().as_deref(), Some("r-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn state_resets_after_failure() {
        let endpoint = ScriptedEndpoint::new(
            vec![
                (Duration::ZERO, server_error()),
                (Duration::ZERO, server_error()),
                (Duration::ZERO, server_error()),
                (Duration::ZERO, server_error()),
            ],
            (Duration::ZERO, ok("a-2", None)),
        );
        let coordinator = signed_in(Arc::clone(&endpoint));

        assert!(coordinator.refresh_token().await.is_err());
        assert!(!coordinator.is_refreshing());

        assert_eq!(coordinator.refresh_token().await, Ok(AccessToken::new("a-2")));
        assert_eq!(endpoint.calls(), 5);
        assert_eq!(coordinator.retry_attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_within_retry_budget() {
        let endpoint = ScriptedEndpoint::new(
            vec![
                (Duration::ZERO, server_error()),
                (
                    Duration::ZERO,
                    Err(RefreshError::Network {
                        details: "reset".to_string(),
                    }),
                ),
            ],
            (Duration::ZERO, ok("a-2", None)),
        );
        let coordinator = signed_in(Arc::clone(&endpoint));
        let started = tokio::time::Instant::now();

        assert_eq!(coordinator.refresh_token().await, Ok(AccessToken::new("a-2")));
        assert_eq!(endpoint.calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_refresh_token_fails_without_network() {
        let endpoint = ScriptedEndpoint::always((Duration::ZERO, ok("a", None)));
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&endpoint) as Arc<dyn TokenEndpoint>,
            CredentialStore::in_memory(CookiePolicy::default()),
        );
        let started = tokio::time::Instant::now();

        assert_eq!(
            coordinator.refresh_token().await,
            Err(RefreshError::NoRefreshToken)
        );
        assert_eq!(endpoint.calls(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_counts_as_retryable() {
        let endpoint = ScriptedEndpoint::new(
            vec![(Duration::from_secs(30), ok("too-late", None))],
            (Duration::ZERO, ok("a-2", None)),
        );
        let coordinator = signed_in(Arc::clone(&endpoint));
        let started = tokio::time::Instant::now();

        assert_eq!(coordinator.refresh_token().await, Ok(AccessToken::new("a-2")));
        assert_eq!(endpoint.calls(), 2);
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_refresh_syncs_both_stores() {
        let endpoint = ScriptedEndpoint::always((Duration::ZERO, ok("a-2", Some("r-2"))));
        let coordinator = signed_in(endpoint);

        coordinator.refresh_token().await.expect("refresh");

        let credentials = coordinator.credentials();
        assert_eq!(credentials.access_token().as_deref(), Some("a-2"));
        assert_eq!(credentials.refresh_token().as_deref(), Some("r-2"));
        assert_eq!(
            credentials.cookies().get(ACCESS_TOKEN_COOKIE),
            credentials.access_token()
        );
        assert_eq!(
            credentials.cookies().get(REFRESH_TOKEN_COOKIE),
            credentials.refresh_token()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn clear_during_refresh_discards_result() {
        let endpoint = ScriptedEndpoint::always((Duration::from_secs(1), ok("a-2", Some("r-2"))));
        let coordinator = signed_in(endpoint);

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh_token().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(coordinator.is_refreshing());

        coordinator.clear_tokens().expect("clear");
        assert!(!coordinator.is_refreshing());

        let outcome = pending.await.expect("join");
        assert_eq!(outcome, Err(RefreshError::SessionCleared));
        assert!(coordinator.credentials().access_token().is_none());
        assert!(coordinator.credentials().cookies().get(ACCESS_TOKEN_COOKIE).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn login_during_refresh_keeps_new_session() {
        let endpoint = ScriptedEndpoint::always((Duration::from_secs(1), ok("stale", None)));
        let coordinator = signed_in(endpoint);

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh_token().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let fresh = token_expiring_in(3600);
        coordinator
            .store_session(&TokenPair::new(fresh.clone(), Some("r-9".to_string())))
            .expect("store session");

        assert_eq!(pending.await.expect("join"), Ok(AccessToken::new(fresh.clone())));
        assert_eq!(coordinator.credentials().access_token(), Some(fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_after_login_runs_beside_the_abandoned_one() {
        let endpoint = ScriptedEndpoint::new(
            vec![
                (Duration::from_secs(2), ok("stale", Some("r-stale"))),
                (Duration::from_millis(100), ok("a-new", None)),
            ],
            (Duration::ZERO, server_error()),
        );
        let coordinator = signed_in(Arc::clone(&endpoint));

        let abandoned = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh_token().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator
            .store_session(&TokenPair::new(
                token_expiring_in(30),
                Some("r-9".to_string()),
            ))
            .expect("store session");

        let renewed = coordinator.refresh_token().await;

        assert_eq!(renewed, Ok(AccessToken::new("a-new")));
        assert_eq!(endpoint.calls(), 2);
        assert!(abandoned.await.expect("join").is_ok());
        assert_eq!(coordinator.credentials().access_token().as_deref(), Some("a-new"));
        assert_eq!(coordinator.credentials().refresh_token().as_deref(), Some("r-9"));
    }

    #[tokio::test]
    async fn refresh_window_boundaries() {
        let now = Utc::now();
        let endpoint = ScriptedEndpoint::always((Duration::ZERO, ok("a", None)));
        let coordinator = RefreshCoordinator::new(
            endpoint,
            CredentialStore::in_memory(CookiePolicy::default()),
        );

        coordinator
            .store_session(&TokenPair::new(token_expiring_at(now.timestamp() + 299), None))
            .expect("store");
        assert!(coordinator.should_refresh_token_at(now));

        coordinator
            .store_session(&TokenPair::new(token_expiring_at(now.timestamp() + 301), None))
            .expect("store");
        assert!(!coordinator.should_refresh_token_at(now));
        assert_eq!(coordinator.time_until_expiry_at(now), Some(301));
    }

    #[tokio::test]
    async fn token_invalid_at_expiry_instant() {
        let now = Utc::now();
        let endpoint = ScriptedEndpoint::always((Duration::ZERO, ok("a", None)));
        let coordinator = RefreshCoordinator::new(
            endpoint,
            CredentialStore::in_memory(CookiePolicy::default()),
        );
        coordinator
            .store_session(&TokenPair::new(token_expiring_at(now.timestamp()), None))
            .expect("store");

        assert!(!coordinator.is_token_valid_at(now));
        assert_eq!(coordinator.time_until_expiry_at(now), Some(0));
        assert!(coordinator.is_token_valid_at(now - chrono::Duration::seconds(1)));
    }

    #[tokio::test]
    async fn observers_fail_closed_on_malformed_tokens() {
        let endpoint = ScriptedEndpoint::always((Duration::ZERO, ok("a", None)));
        let coordinator = RefreshCoordinator::new(
            endpoint,
            CredentialStore::in_memory(CookiePolicy::default()),
        );
        assert!(!coordinator.is_token_valid());
        assert!(!coordinator.should_refresh_token());
        assert_eq!(coordinator.time_until_expiry(), None);

        coordinator
            .store_session(&TokenPair::new("not.a.jwt", None))
            .expect("store");
        assert!(!coordinator.is_token_valid());
        assert!(!coordinator.should_refresh_token());
        assert_eq!(coordinator.time_until_expiry(), None);
    }

    #[tokio::test]
    async fn clear_tokens_empties_both_stores() {
        let endpoint = ScriptedEndpoint::always((Duration::ZERO, ok("a", None)));
        let coordinator = signed_in(endpoint);

        coordinator.clear_tokens().expect("clear");

        let credentials = coordinator.credentials();
        assert!(credentials.access_token().is_none());
        assert!(credentials.refresh_token().is_none());
        assert!(credentials.cookies().get(ACCESS_TOKEN_COOKIE).is_none());
        assert!(credentials.cookies().get(REFRESH_TOKEN_COOKIE).is_none());
        assert!(!credentials.has_session_marker());
        assert_eq!(coordinator.retry_attempt(), 0);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }
}

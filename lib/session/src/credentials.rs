//! Credential storage kept in two places.
//!
//! The durable store is what the client runtime reads. The cookie mirror is
//! what a server-side layer reads. After every store both hold identical
//! token values.
//!
//! # Clearing order
//!
//! The two stores cannot be cleared atomically. `clear` removes the durable
//! entries first and the cookies second, so the only inconsistency window
//! is "cookies present, durable store empty". Nothing trusts cookies over
//! the durable store on the client side: `access_token()` and
//! `refresh_token()` read the durable store only and never fall back to the
//! cookies, so a half-finished clear reads as signed out here. The gate
//! only ever lets such a navigation render, and the client's first request
//! will find no token.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::claims::AccessClaims;
use crate::cookies::{
    ACCESS_TOKEN_COOKIE, AUTH_STATE_COOKIE, CREDENTIAL_COOKIES, CookieMirror, CookiePolicy,
    REFRESH_TOKEN_COOKIE, USER_ROLE_COOKIE,
};
use crate::error::StorageError;
use crate::storage::{KeyValueStore, MemoryStore};

/// Durable store key for the access token.
pub const ACCESS_TOKEN_KEY: &str = ACCESS_TOKEN_COOKIE;

/// Durable store key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = REFRESH_TOKEN_COOKIE;

/// A bearer access token.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the token's claims, failing closed.
    #[must_use]
    pub fn claims(&self) -> Option<AccessClaims> {
        AccessClaims::read(&self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Tokens to persist after login or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// New access token.
    pub access: String,
    /// New refresh token; `None` keeps the stored one (no rotation).
    pub refresh: Option<String>,
}

impl TokenPair {
    /// Creates a pair.
    #[must_use]
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: access.into(),
            refresh,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"..")
            .field("refresh", &self.refresh.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Both credential stores behind one write path.
#[derive(Clone)]
pub struct CredentialStore {
    durable: Arc<dyn KeyValueStore>,
    cookies: Arc<CookieMirror>,
    policy: CookiePolicy,
}

impl CredentialStore {
    /// Creates a store over the given durable store and cookie mirror.
    #[must_use]
    pub fn new(
        durable: Arc<dyn KeyValueStore>,
        cookies: Arc<CookieMirror>,
        policy: CookiePolicy,
    ) -> Self {
        Self {
            durable,
            cookies,
            policy,
        }
    }

    /// Creates a store that lives only in this process.
    #[must_use]
    pub fn in_memory(policy: CookiePolicy) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(CookieMirror::new()),
            policy,
        )
    }

    /// Returns the stored access token.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.durable.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Returns the stored refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.durable.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Returns the durable store.
    #[must_use]
    pub fn durable(&self) -> &dyn KeyValueStore {
        self.durable.as_ref()
    }

    /// Returns the cookie mirror.
    #[must_use]
    pub fn cookies(&self) -> &CookieMirror {
        &self.cookies
    }

    /// Returns the cookie policy.
    #[must_use]
    pub fn policy(&self) -> &CookiePolicy {
        &self.policy
    }

    /// Writes a token pair to the durable store, then to the cookies.
    ///
    /// Also sets the session marker cookie and, when the access token
    /// decodes, the role cookie.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store rejects a write. Cookies are
    /// not touched in that case, and an access token already written is
    /// put back to its previous value so the durable store keeps the old
    /// pair.
    pub fn store(&self, pair: &TokenPair) -> Result<(), StorageError> {
        let previous_access = self.durable.get(ACCESS_TOKEN_KEY);
        self.durable.set(ACCESS_TOKEN_KEY, &pair.access)?;
        if let Some(refresh) = &pair.refresh {
            if let Err(err) = self.durable.set(REFRESH_TOKEN_KEY, refresh) {
                self.restore_access(previous_access.as_deref());
                return Err(err);
            }
        }

        self.cookies.set(self.policy.access_cookie(&pair.access));
        if let Some(refresh) = &pair.refresh {
            self.cookies.set(self.policy.refresh_cookie(refresh));
        } else if let Some(existing) = self.durable.get(REFRESH_TOKEN_KEY) {
            // Keep the cookie copy in step with the durable one.
            self.cookies.set(self.policy.refresh_cookie(&existing));
        }
        self.cookies.set(self.policy.session_marker_cookie());
        match AccessClaims::read(&pair.access) {
            Some(claims) => self.cookies.set(self.policy.role_cookie(claims.role)),
            None => self.cookies.remove(USER_ROLE_COOKIE),
        }

        debug!(rotated = pair.refresh.is_some(), "stored credentials");
        Ok(())
    }

    fn restore_access(&self, previous: Option<&str>) {
        let restored = match previous {
            Some(token) => self.durable.set(ACCESS_TOKEN_KEY, token),
            None => self.durable.remove(ACCESS_TOKEN_KEY),
        };
        if let Err(err) = restored {
            warn!(error = %err, "failed to restore previous access token");
        }
    }

    /// Clears the durable store, then the cookies.
    ///
    /// Cookies are cleared even if the durable store fails; the first
    /// durable error is returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store could not remove an entry.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(err) = self.durable.remove(key) {
                warn!(key, error = %err, "failed to clear durable credential");
                first_error.get_or_insert(err);
            }
        }

        for name in CREDENTIAL_COOKIES {
            self.cookies.remove(name);
        }

        debug!("cleared credentials");
        first_error.map_or(Ok(()), Err)
    }

    /// Returns true when the session marker cookie is present.
    #[must_use]
    pub fn has_session_marker(&self) -> bool {
        self.cookies.get(AUTH_STATE_COOKIE).is_some()
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

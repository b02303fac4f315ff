//! Credential cookies.
//!
//! Cookies mirror the durable store so that a server-side layer (the route
//! gate) can read session state before any client code runs. Besides the
//! two tokens there are two non-sensitive cookies: a session marker and the
//! account role, used when the token itself is not readable.
//!
//! `CookiePolicy` builds every cookie the system sets, for both the
//! client-side `CookieMirror` and the server's `Set-Cookie` responses.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::role::Role;

/// Access token cookie (and durable store key).
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Refresh token cookie (and durable store key).
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Session marker cookie.
pub const AUTH_STATE_COOKIE: &str = "auth_state";

/// Value of the session marker cookie while signed in.
pub const AUTH_STATE_AUTHENTICATED: &str = "authenticated";

/// Account role cookie.
pub const USER_ROLE_COOKIE: &str = "user_role";

/// Attributes applied to credential cookies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CookiePolicy {
    /// Whether to set the Secure flag (requires HTTPS).
    #[serde(default = "default_secure")]
    pub secure: bool,
    /// Whether to set HttpOnly. Client-side mirrors leave this off so the
    /// runtime can read them; server-set cookies may turn it on.
    #[serde(default)]
    pub http_only: bool,
    /// Lifetime of the access token cookie, in seconds.
    #[serde(default = "default_access_max_age_secs")]
    pub access_max_age_secs: i64,
    /// Lifetime of the refresh token, marker and role cookies, in seconds.
    #[serde(default = "default_refresh_max_age_secs")]
    pub refresh_max_age_secs: i64,
}

fn default_secure() -> bool {
    true
}

fn default_access_max_age_secs() -> i64 {
    3600
}

fn default_refresh_max_age_secs() -> i64 {
    604_800
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            secure: default_secure(),
            http_only: false,
            access_max_age_secs: default_access_max_age_secs(),
            refresh_max_age_secs: default_refresh_max_age_secs(),
        }
    }
}

impl CookiePolicy {
    fn build(&self, name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
        let max_age = Duration::seconds(max_age_secs);
        Cookie::build((name, value))
            .path("/")
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(SameSite::Strict)
            .max_age(max_age)
            .expires(OffsetDateTime::now_utc() + max_age)
            .build()
    }

    /// Builds the access token cookie.
    #[must_use]
    pub fn access_cookie(&self, token: &str) -> Cookie<'static> {
        self.build(
            ACCESS_TOKEN_COOKIE,
            token.to_string(),
            self.access_max_age_secs,
        )
    }

    /// Builds the refresh token cookie.
    #[must_use]
    pub fn refresh_cookie(&self, token: &str) -> Cookie<'static> {
        self.build(
            REFRESH_TOKEN_COOKIE,
            token.to_string(),
            self.refresh_max_age_secs,
        )
    }

    /// Builds the `auth_state=authenticated` marker cookie.
    #[must_use]
    pub fn session_marker_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.build(
            AUTH_STATE_COOKIE,
            AUTH_STATE_AUTHENTICATED.to_string(),
            self.refresh_max_age_secs,
        );
        cookie.set_http_only(false);
        cookie
    }

    /// Builds the role cookie.
    #[must_use]
    pub fn role_cookie(&self, role: Role) -> Cookie<'static> {
        let mut cookie = self.build(
            USER_ROLE_COOKIE,
            role.as_str().to_string(),
            self.refresh_max_age_secs,
        );
        cookie.set_http_only(false);
        cookie
    }

    /// Builds a cookie that deletes `name` in the browser.
    #[must_use]
    pub fn removal(name: &'static str) -> Cookie<'static> {
        Cookie::build((name, ""))
            .path("/")
            .max_age(Duration::ZERO)
            .build()
    }
}

/// Names of every cookie the session writes, in clearing order.
pub const CREDENTIAL_COOKIES: [&str; 4] = [
    ACCESS_TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
    AUTH_STATE_COOKIE,
    USER_ROLE_COOKIE,
];

/// In-process cookie jar mirroring the durable store.
///
/// Honors expiry: a cookie past its `Expires` time reads as absent.
#[derive(Debug, Default)]
pub struct CookieMirror {
    cookies: Mutex<HashMap<String, Cookie<'static>>>,
}

impl CookieMirror {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or replaces a cookie.
    pub fn set(&self, cookie: Cookie<'static>) {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cookie.name().to_string(), cookie);
    }

    /// Returns the value of an unexpired cookie.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.cookie(name).map(|c| c.value().to_string())
    }

    /// Returns an unexpired cookie with all its attributes.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = cookies
            .get(name)?
            .expires_datetime()
            .is_some_and(|at| at <= OffsetDateTime::now_utc());
        if expired {
            cookies.remove(name);
            return None;
        }
        cookies.get(name).cloned()
    }

    /// Removes a cookie.
    pub fn remove(&self, name: &str) {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

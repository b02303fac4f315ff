//! Session configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use learnhub_core::Result;
use serde::Deserialize;

use crate::cookies::{CookieMirror, CookiePolicy};
use crate::coordinator::{RefreshCoordinator, RetryPolicy};
use crate::credentials::CredentialStore;
use crate::endpoints::{AuthEndpoints, TokenEndpoint};
use crate::error::ConfigError;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::transport::{ApiBase, HttpTransport, ReqwestTransport};

/// Client-side session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Base URL of the backend API, e.g. `https://api.example.com/api`.
    pub api_base_url: String,
    /// Per-request and per-refresh-attempt timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Refresh retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds; doubles per retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Refresh when the access token has fewer seconds than this left.
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,
    /// Refresh before sending a request whose token is about to expire.
    #[serde(default = "default_true")]
    pub proactive_refresh: bool,
    /// Set the Secure flag on credential cookies.
    #[serde(default = "default_true")]
    pub secure_cookies: bool,
    /// Set HttpOnly on token cookies.
    #[serde(default)]
    pub http_only_cookies: bool,
    /// Access token cookie lifetime, in seconds.
    #[serde(default = "default_access_cookie_max_age_secs")]
    pub access_cookie_max_age_secs: i64,
    /// Refresh token cookie lifetime, in seconds.
    #[serde(default = "default_refresh_cookie_max_age_secs")]
    pub refresh_cookie_max_age_secs: i64,
    /// Where to send the user when the session cannot be recovered.
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,
    /// JSON file backing the durable store. In-memory when unset.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_refresh_threshold_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_access_cookie_max_age_secs() -> i64 {
    3600
}

fn default_refresh_cookie_max_age_secs() -> i64 {
    604_800
}

fn default_sign_in_path() -> String {
    "/sign-in".to_string()
}

impl SessionConfig {
    /// Creates a config with defaults for everything but the API base.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            refresh_threshold_secs: default_refresh_threshold_secs(),
            proactive_refresh: true,
            secure_cookies: true,
            http_only_cookies: false,
            access_cookie_max_age_secs: default_access_cookie_max_age_secs(),
            refresh_cookie_max_age_secs: default_refresh_cookie_max_age_secs(),
            sign_in_path: default_sign_in_path(),
            storage_path: None,
        }
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the refresh window.
    #[must_use]
    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }

    /// Returns the refresh retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            attempt_timeout: self.request_timeout(),
        }
    }

    /// Returns the cookie policy.
    #[must_use]
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            secure: self.secure_cookies,
            http_only: self.http_only_cookies,
            access_max_age_secs: self.access_cookie_max_age_secs,
            refresh_max_age_secs: self.refresh_cookie_max_age_secs,
        }
    }

    /// Parses the API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn api_base(&self) -> Result<ApiBase, ConfigError> {
        Ok(ApiBase::parse(&self.api_base_url)?)
    }

    /// Opens the configured durable store behind a fresh cookie mirror.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage file cannot be opened.
    pub fn credential_store(&self) -> Result<CredentialStore, ConfigError> {
        let durable: Arc<dyn KeyValueStore> = match &self.storage_path {
            Some(path) => Arc::new(FileStore::open(path).map_err(|e| {
                ConfigError::StorageUnavailable {
                    reason: e.to_string(),
                }
            })?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(CredentialStore::new(
            durable,
            Arc::new(CookieMirror::new()),
            self.cookie_policy(),
        ))
    }

    /// Builds the production transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn transport(&self) -> Result<Arc<dyn HttpTransport>, ConfigError> {
        Ok(Arc::new(ReqwestTransport::new(self.request_timeout())?))
    }

    /// Builds a coordinator over the given transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or storage is invalid.
    pub fn coordinator(
        &self,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<RefreshCoordinator, ConfigError> {
        let endpoints: Arc<dyn TokenEndpoint> =
            Arc::new(AuthEndpoints::new(transport, self.api_base()?));
        Ok(RefreshCoordinator::with_policy(
            endpoints,
            self.credential_store()?,
            self.retry_policy(),
            self.refresh_threshold(),
        ))
    }
}

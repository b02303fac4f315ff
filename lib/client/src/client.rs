//! Authenticated request wrapper.
//!
//! `ApiClient` attaches the stored bearer token to every request and
//! recovers from a 401 by refreshing through the shared
//! `RefreshCoordinator` and replaying the request exactly once. A second
//! 401 is returned to the caller as an ordinary response.
//!
//! When the refresh itself fails the caller gets `RequestError::RefreshFailed`
//! and, separately, the session is cleared and the navigator is asked to
//! show the sign-in page. One request runs the retry schedule at most once:
//! a failed proactive refresh either ends the session before sending (the
//! token is already expired) or ends it on the 401 without refreshing again.

use std::fmt;
use std::sync::Arc;

use learnhub_session::{
    AccessToken, ApiBase, ApiRequest, ApiResponse, ConfigError, HttpTransport,
    RefreshCoordinator, RefreshError, SessionConfig,
};
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use rootcause::prelude::Report;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::RequestError;
use crate::navigator::Navigator;

/// Method, headers and body of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: Method,
    /// Extra headers.
    pub headers: HeaderMap,
    /// Body.
    pub body: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    /// Creates options without headers or body.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates options carrying a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(method: Method, body: &T) -> Result<Self, RequestError> {
        let json = serde_json::to_string(body).map_err(|e| RequestError::InvalidRequest {
            reason: e.to_string(),
        })?;
        let mut options = Self::new(method);
        options
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        options.body = Some(json);
        Ok(options)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// HTTP client that keeps requests authenticated.
#[derive(Clone)]
pub struct ApiClient {
    coordinator: RefreshCoordinator,
    transport: Arc<dyn HttpTransport>,
    base: ApiBase,
    navigator: Arc<dyn Navigator>,
    sign_in_path: String,
    proactive_refresh: bool,
}

impl ApiClient {
    /// Creates a client.
    ///
    /// Proactive refresh is on and the sign-in path is `/sign-in`.
    #[must_use]
    pub fn new(
        coordinator: RefreshCoordinator,
        transport: Arc<dyn HttpTransport>,
        base: ApiBase,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            coordinator,
            transport,
            base,
            navigator,
            sign_in_path: "/sign-in".to_string(),
            proactive_refresh: true,
        }
    }

    /// Builds a client and its coordinator from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or the durable store is invalid.
    pub fn from_config(
        config: &SessionConfig,
        transport: Arc<dyn HttpTransport>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, Report<ConfigError>> {
        let coordinator = config.coordinator(Arc::clone(&transport))?;
        Ok(Self::new(coordinator, transport, config.api_base()?, navigator)
            .with_sign_in_path(config.sign_in_path.clone())
            .with_proactive_refresh(config.proactive_refresh))
    }

    /// Sets the sign-in path used after an unrecoverable refresh failure.
    #[must_use]
    pub fn with_sign_in_path(mut self, path: impl Into<String>) -> Self {
        self.sign_in_path = path.into();
        self
    }

    /// Enables or disables refreshing before a request whose token is
    /// about to expire.
    #[must_use]
    pub fn with_proactive_refresh(mut self, enabled: bool) -> Self {
        self.proactive_refresh = enabled;
        self
    }

    /// Returns the refresh coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Returns the API base.
    #[must_use]
    pub fn base(&self) -> &ApiBase {
        &self.base
    }

    /// Returns the transport.
    #[must_use]
    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    /// Sends a request.
    ///
    /// `url` may be absolute or relative to the API base. Unless
    /// `skip_auth` is set, the stored access token is attached and a 401 is
    /// recovered by refreshing and replaying once. Every other status is
    /// returned as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built, the transport
    /// fails, or a needed refresh fails.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn request(
        &self,
        url: &str,
        options: RequestOptions,
        skip_auth: bool,
    ) -> Result<ApiResponse, Report<RequestError>> {
        let mut request = ApiRequest {
            method: options.method,
            url: self.base.resolve(url),
            headers: options.headers,
            body: options.body,
        };

        if skip_auth {
            return self.send(request).await;
        }

        let mut proactive_failure = None;
        if self.proactive_refresh && self.coordinator.should_refresh_token() {
            debug!("access token close to expiry, refreshing first");
            match self.coordinator.refresh_token().await {
                Ok(_) => {}
                Err(err) if !self.coordinator.is_token_valid() => {
                    self.end_session(&err);
                    return Err(RequestError::RefreshFailed { source: err }.into());
                }
                Err(err) => {
                    warn!(error = %err, "proactive refresh failed, sending with current token");
                    proactive_failure = Some(err);
                }
            }
        }

        let sent = self.coordinator.access_token();
        if let Some(token) = &sent {
            attach(&mut request, token)?;
        }

        let response = self.send(request.clone()).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }
        self.recover(request, sent, proactive_failure).await
    }

    /// Replays a 401 once with a fresh token.
    ///
    /// `proactive_failure` is the outcome of a refresh already exhausted for
    /// the token that was sent; it ends the session without a second retry
    /// schedule.
    async fn recover(
        &self,
        mut request: ApiRequest,
        sent: Option<AccessToken>,
        proactive_failure: Option<RefreshError>,
    ) -> Result<ApiResponse, Report<RequestError>> {
        let token = match (self.coordinator.access_token(), proactive_failure) {
            (Some(current), _) if sent.as_ref() != Some(&current) => {
                debug!("access token changed while request was in flight");
                current
            }
            (_, Some(err)) => {
                self.end_session(&err);
                return Err(RequestError::RefreshFailed { source: err }.into());
            }
            (_, None) => match self.coordinator.wait_for_refresh().await {
                Ok(token) => token,
                Err(err) => {
                    self.end_session(&err);
                    return Err(RequestError::RefreshFailed { source: err }.into());
                }
            },
        };

        attach(&mut request, &token)?;
        let url = request.url.clone();
        let response = self.send(request).await?;
        if response.is_unauthorized() {
            warn!(%url, "request still unauthorized after refresh");
        }
        Ok(response)
    }

    fn end_session(&self, err: &RefreshError) {
        warn!(error = %err, "session could not be refreshed, signing out");
        if let Err(report) = self.coordinator.clear_tokens() {
            warn!(error = %report, "failed to clear credentials");
        }
        self.navigator.redirect_to_sign_in(&self.sign_in_path);
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Report<RequestError>> {
        let url = request.url.clone();
        Ok(self
            .transport
            .send(request)
            .await
            .map_err(|source| RequestError::Transport { url, source })?)
    }

    /// Sends a GET.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn get(&self, url: &str) -> Result<ApiResponse, Report<RequestError>> {
        self.request(url, RequestOptions::new(Method::GET), false)
            .await
    }

    /// Sends a DELETE.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn delete(&self, url: &str) -> Result<ApiResponse, Report<RequestError>> {
        self.request(url, RequestOptions::new(Method::DELETE), false)
            .await
    }

    /// Sends a POST with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<ApiResponse, Report<RequestError>> {
        self.request(url, RequestOptions::json(Method::POST, body)?, false)
            .await
    }

    /// Sends a PUT with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<ApiResponse, Report<RequestError>> {
        self.request(url, RequestOptions::json(Method::PUT, body)?, false)
            .await
    }

    /// Sends a PATCH with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn patch<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<ApiResponse, Report<RequestError>> {
        self.request(url, RequestOptions::json(Method::PATCH, body)?, false)
            .await
    }
}

fn attach(request: &mut ApiRequest, token: &AccessToken) -> Result<(), RequestError> {
    request
        .set_bearer(token.as_str())
        .map_err(|e| RequestError::InvalidRequest {
            reason: e.to_string(),
        })
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base)
            .field("sign_in_path", &self.sign_in_path)
            .field("proactive_refresh", &self.proactive_refresh)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::Navigation;
    use crate::testing::{FakeBackend, RequestExt, client_with, opaque_session, token_expiring_in};
    use learnhub_session::endpoints::REFRESH_PATH;
    use learnhub_session::{CookiePolicy, CredentialStore, TokenPair};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::time::Duration;

    fn unauthorized() -> ApiResponse {
        ApiResponse::json_body(
            StatusCode::UNAUTHORIZED,
            &json!({"detail": "Given token not valid", "code": "token_not_valid"}),
        )
    }

    fn ok() -> ApiResponse {
        ApiResponse::json_body(StatusCode::OK, &json!({"results": []}))
    }

    fn refreshed(access: &str) -> ApiResponse {
        ApiResponse::json_body(StatusCode::OK, &json!({"access": access}))
    }

    /// Courses accept only `new`; refresh hands out `new`.
    fn rotating_backend(delay: Duration) -> Arc<FakeBackend> {
        FakeBackend::with_refresh_delay(
            |request| match request.path() {
                REFRESH_PATH => refreshed("new"),
                _ if request.bearer() == Some("new") => ok(),
                _ => unauthorized(),
            },
            delay,
        )
    }

    #[tokio::test]
    async fn attaches_bearer_and_resolves_relative_urls() {
        let backend = FakeBackend::new(|_| ok());
        let credentials = opaque_session("old");
        let (client, _rx) = client_with(Arc::clone(&backend), credentials);

        let response = client.get("/courses/").await.expect("request");

        assert_eq!(response.status, StatusCode::OK);
        let sent = backend.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://api.example.com/api/courses/");
        assert_eq!(sent[0].bearer(), Some("old"));
    }

    #[tokio::test]
    async fn skip_auth_sends_no_bearer_and_skips_recovery() {
        let backend = FakeBackend::new(|_| unauthorized());
        let (client, _rx) = client_with(Arc::clone(&backend), opaque_session("old"));

        let response = client
            .request("users/login/", RequestOptions::new(Method::POST), true)
            .await
            .expect("request");

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(backend.requests()[0].bearer().is_none());
        assert_eq!(backend.count(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn non_401_errors_pass_through() {
        let backend = FakeBackend::new(|_| ApiResponse::new(StatusCode::FORBIDDEN, ""));
        let (client, _rx) = client_with(Arc::clone(&backend), opaque_session("old"));

        let response = client.get("courses/").await.expect("request");

        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(backend.count(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn recovers_from_401_by_refreshing_and_replaying() {
        let backend = rotating_backend(Duration::ZERO);
        let (client, _rx) = client_with(Arc::clone(&backend), opaque_session("old"));

        let response = client
            .post("courses/12/enroll/", &json!({"plan": "free"}))
            .await
            .expect("request");

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(backend.count(REFRESH_PATH), 1);
        let attempts = backend.requests_to("courses/12/enroll/");
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].bearer(), Some("old"));
        assert_eq!(attempts[1].bearer(), Some("new"));
        assert_eq!(attempts[0].method, attempts[1].method);
        assert_eq!(attempts[0].body, attempts[1].body);
        assert_eq!(
            client.coordinator().credentials().access_token().as_deref(),
            Some("new")
        );
    }

    #[tokio::test]
    async fn replays_only_once() {
        let backend = FakeBackend::new(|request| match request.path() {
            REFRESH_PATH => refreshed("new"),
            _ => unauthorized(),
        });
        let (client, mut rx) = client_with(Arc::clone(&backend), opaque_session("old"));

        let response = client.get("courses/").await.expect("request");

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(backend.requests_to("courses/").len(), 2);
        assert_eq!(backend.count(REFRESH_PATH), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_401s_share_one_refresh() {
        let backend = rotating_backend(Duration::from_millis(100));
        let (client, _rx) = client_with(Arc::clone(&backend), opaque_session("old"));

        let (a, b, c) = tokio::join!(
            client.get("courses/"),
            client.get("lessons/"),
            client.delete("bookmarks/3/"),
        );

        for response in [a, b, c] {
            assert_eq!(response.expect("request").status, StatusCode::OK);
        }
        assert_eq!(backend.count(REFRESH_PATH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_signs_out_and_reports() {
        let backend = FakeBackend::new(|request| match request.path() {
            REFRESH_PATH => ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, ""),
            _ => unauthorized(),
        });
        let (client, mut rx) = client_with(Arc::clone(&backend), opaque_session("old"));

        let report = client.get("courses/").await.unwrap_err();

        assert_eq!(
            report.current_context(),
            &RequestError::RefreshFailed {
                source: RefreshError::Server { status: 500 }
            }
        );
        assert_eq!(backend.count(REFRESH_PATH), 4);
        let credentials = client.coordinator().credentials();
        assert!(credentials.access_token().is_none());
        assert!(credentials.refresh_token().is_none());
        assert_eq!(
            rx.try_recv().expect("navigation"),
            Navigation::SignIn {
                path: "/sign-in".to_string()
            }
        );
    }

    #[tokio::test]
    async fn missing_refresh_token_signs_out_without_refresh_call() {
        let backend = FakeBackend::new(|_| unauthorized());
        let credentials = CredentialStore::in_memory(CookiePolicy::default());
        credentials
            .store(&TokenPair::new("old", None))
            .expect("store");
        let (client, mut rx) = client_with(Arc::clone(&backend), credentials);

        let report = client.get("courses/").await.unwrap_err();

        assert_eq!(
            report.current_context(),
            &RequestError::RefreshFailed {
                source: RefreshError::NoRefreshToken
            }
        );
        assert_eq!(backend.count(REFRESH_PATH), 0);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn replays_with_token_refreshed_elsewhere() {
        let credentials = opaque_session("old");
        let other_tab = credentials.clone();
        let backend = FakeBackend::new(move |request| match request.bearer() {
            Some("old") => {
                other_tab
                    .store(&TokenPair::new("new", None))
                    .expect("store");
                unauthorized()
            }
            Some("new") => ok(),
            _ => unauthorized(),
        });
        let (client, _rx) = client_with(Arc::clone(&backend), credentials);

        let response = client.get("courses/").await.expect("request");

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(backend.count(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn refreshes_proactively_before_expiry() {
        let backend = FakeBackend::new(|request| match request.path() {
            REFRESH_PATH => refreshed("fresh"),
            _ if request.bearer() == Some("fresh") => ok(),
            _ => unauthorized(),
        });
        let credentials = CredentialStore::in_memory(CookiePolicy::default());
        credentials
            .store(&TokenPair::new(token_expiring_in(60), Some("r".to_string())))
            .expect("store");
        let (client, _rx) = client_with(Arc::clone(&backend), credentials);

        let response = client.get("courses/").await.expect("request");

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(backend.count(REFRESH_PATH), 1);
        assert_eq!(backend.requests_to("courses/").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn proactive_refresh_failure_still_sends() {
        let backend = FakeBackend::new(|request| match request.path() {
            REFRESH_PATH => ApiResponse::new(StatusCode::BAD_GATEWAY, ""),
            _ => ok(),
        });
        let credentials = CredentialStore::in_memory(CookiePolicy::default());
        let expiring = token_expiring_in(60);
        credentials
            .store(&TokenPair::new(expiring.clone(), Some("r".to_string())))
            .expect("store");
        let (client, mut rx) = client_with(Arc::clone(&backend), credentials);

        let response = client.get("courses/").await.expect("request");

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            backend.requests_to("courses/")[0].bearer(),
            Some(expiring.as_str())
        );
        assert!(rx.try_recv().is_err());
        assert!(client.coordinator().credentials().refresh_token().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_with_failed_refresh_signs_out_without_sending() {
        let backend = FakeBackend::new(|request| match request.path() {
            REFRESH_PATH => ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, ""),
            _ => unauthorized(),
        });
        let credentials = CredentialStore::in_memory(CookiePolicy::default());
        credentials
            .store(&TokenPair::new(token_expiring_in(-10), Some("r".to_string())))
            .expect("store");
        let (client, mut rx) = client_with(Arc::clone(&backend), credentials);

        let started = tokio::time::Instant::now();
        let report = client.get("courses/").await.unwrap_err();

        assert_eq!(
            report.current_context(),
            &RequestError::RefreshFailed {
                source: RefreshError::Server { status: 500 }
            }
        );
        assert_eq!(backend.count(REFRESH_PATH), 4);
        assert!(backend.requests_to("courses/").is_empty());
        assert!(started.elapsed() < Duration::from_secs(8));
        assert!(client.coordinator().credentials().refresh_token().is_none());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_proactive_refresh_is_not_repeated_on_401() {
        let backend = FakeBackend::new(|request| match request.path() {
            REFRESH_PATH => ApiResponse::new(StatusCode::BAD_GATEWAY, ""),
            _ => unauthorized(),
        });
        let credentials = CredentialStore::in_memory(CookiePolicy::default());
        credentials
            .store(&TokenPair::new(token_expiring_in(60), Some("r".to_string())))
            .expect("store");
        let (client, mut rx) = client_with(Arc::clone(&backend), credentials);

        let report = client.get("courses/").await.unwrap_err();

        assert_eq!(
            report.current_context(),
            &RequestError::RefreshFailed {
                source: RefreshError::Server { status: 502 }
            }
        );
        assert_eq!(backend.count(REFRESH_PATH), 4);
        assert_eq!(backend.requests_to("courses/").len(), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn proactive_refresh_can_be_disabled() {
        let backend = FakeBackend::new(|_| ok());
        let credentials = CredentialStore::in_memory(CookiePolicy::default());
        credentials
            .store(&TokenPair::new(token_expiring_in(60), Some("r".to_string())))
            .expect("store");
        let (client, _rx) = client_with(Arc::clone(&backend), credentials);
        let client = client.with_proactive_refresh(false);

        client.get("courses/").await.expect("request");

        assert_eq!(backend.count(REFRESH_PATH), 0);
    }

    #[test]
    fn json_options_set_content_type() {
        let options = RequestOptions::json(Method::PUT, &json!({"title": "Intro"})).expect("json");
        assert_eq!(options.method, Method::PUT);
        assert_eq!(
            options.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        assert_eq!(options.body.as_deref(), Some(r#"{"title":"Intro"}"#));
    }
}

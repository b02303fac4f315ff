//! Unauthenticated backend auth endpoints.
//!
//! Login, refresh and logout never carry a bearer token and never go
//! through 401 recovery, so they talk to the transport directly. Backend
//! error bodies are decoded here, once, into `BackendErrorKind`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use learnhub_core::UserId;
use reqwest::{Method, StatusCode};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::error::{EndpointError, RefreshError};
use crate::role::Role;
use crate::transport::{ApiBase, ApiRequest, ApiResponse, HttpTransport};

/// Login endpoint path, relative to the API base.
pub const LOGIN_PATH: &str = "users/login/";
/// Refresh endpoint path.
pub const REFRESH_PATH: &str = "users/refresh-token/";
/// Logout endpoint path.
pub const LOGOUT_PATH: &str = "users/logout/";
/// Profile endpoint path.
pub const PROFILE_PATH: &str = "users/profile/";
/// Email verification endpoint path.
pub const VERIFY_EMAIL_PATH: &str = "users/verify-email/";
/// Resend verification endpoint path.
pub const RESEND_VERIFICATION_PATH: &str = "users/resend-verification/";
/// Password reset request endpoint path.
pub const PASSWORD_RESET_PATH: &str = "users/password-reset/";
/// Password reset confirmation endpoint path.
pub const PASSWORD_RESET_CONFIRM_PATH: &str = "users/password-reset-confirm/";

/// Closed set of backend error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The bearer token was rejected.
    TokenNotValid,
    /// Email/password (or refresh token) did not match.
    InvalidCredentials,
    /// The account exists but its email is unverified.
    EmailNotVerified,
    /// Rate limited.
    Throttled,
    /// Field validation failed; carries the offending field names.
    Validation { fields: Vec<String> },
    /// Anything else, with the backend's message when it sent one.
    Other { message: Option<String> },
}

impl BackendErrorKind {
    /// Decodes an error response.
    ///
    /// Understands the backend's `{"code": ..}`, `{"error": ..}`,
    /// `{"detail": ..}` and field-error (`{"field": ["msg"]}`) shapes.
    #[must_use]
    pub fn decode(status: StatusCode, body: &[u8]) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Self::Throttled;
        }

        let value: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();
        let text = |key: &str| value.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let tag = text("code").or_else(|| text("error"));
        let message = text("detail")
            .or_else(|| text("message"))
            .or_else(|| text("error"));

        match tag.as_deref() {
            Some("token_not_valid") => return Self::TokenNotValid,
            Some("email_not_verified") => return Self::EmailNotVerified,
            Some("invalid_credentials" | "authentication_failed") => {
                return Self::InvalidCredentials;
            }
            Some("throttled") => return Self::Throttled,
            _ => {}
        }

        if status == StatusCode::UNAUTHORIZED {
            return Self::InvalidCredentials;
        }

        if status == StatusCode::BAD_REQUEST {
            if let Some(object) = value.as_object() {
                let mut fields: Vec<String> = object
                    .iter()
                    .filter(|(_, v)| v.is_array())
                    .map(|(k, _)| k.clone())
                    .collect();
                if !fields.is_empty() {
                    fields.sort();
                    return Self::Validation { fields };
                }
            }
        }

        Self::Other { message }
    }

    /// Decodes the kind of a non-success response.
    #[must_use]
    pub fn from_response(response: &ApiResponse) -> Self {
        Self::decode(response.status, &response.body)
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenNotValid => write!(f, "token not valid"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::EmailNotVerified => write!(f, "email not verified"),
            Self::Throttled => write!(f, "too many requests"),
            Self::Validation { fields } => {
                write!(f, "validation failed for: {}", fields.join(", "))
            }
            Self::Other {
                message: Some(message),
            } => write!(f, "{message}"),
            Self::Other { message: None } => write!(f, "request failed"),
        }
    }
}

/// Account profile as returned by login and `users/profile/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Backend account ID.
    pub id: UserId,
    /// Email address.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Role.
    pub role: Role,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Whether the email address has been verified.
    #[serde(default)]
    pub email_verified: bool,
}

/// Body of a successful login.
#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    /// Access token.
    pub access: String,
    /// Refresh token.
    pub refresh: String,
    /// Signed-in account.
    pub user: UserProfile,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponse")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Body of a successful refresh. The refresh token is present only when
/// the backend rotates it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedTokens {
    /// New access token.
    pub access: String,
    /// Rotated refresh token.
    #[serde(default)]
    pub refresh: Option<String>,
}

impl fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("rotated", &self.refresh.is_some())
            .finish_non_exhaustive()
    }
}

/// Trait for exchanging a refresh token for a new access token.
///
/// One call is one network attempt; retries belong to the coordinator.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges `refresh_token` for new tokens.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError>;
}

/// Client for the unauthenticated auth endpoints.
#[derive(Clone)]
pub struct AuthEndpoints {
    transport: Arc<dyn HttpTransport>,
    base: ApiBase,
}

impl AuthEndpoints {
    /// Creates the endpoints client.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, base: ApiBase) -> Self {
        Self { transport, base }
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

    async fn post_json(
        &self,
        path: &'static str,
        body: serde_json::Value,
    ) -> Result<ApiResponse, EndpointError> {
        let transport_error = |source| EndpointError::Transport {
            endpoint: path.to_string(),
            source,
        };
        let request = ApiRequest::new(Method::POST, self.base.resolve(path))
            .with_json(&body)
            .map_err(transport_error)?;
        self.transport.send(request).await.map_err(transport_error)
    }

    /// Signs in with email and password.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails, the backend rejects the
    /// credentials, or the response is not a login response.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<LoginResponse, Report<EndpointError>> {
        let response = self
            .post_json(LOGIN_PATH, json!({ "email": email, "password": password }))
            .await?;

        if !response.is_success() {
            let kind = BackendErrorKind::from_response(&response);
            debug!(status = %response.status, %kind, "login rejected");
            return Err(EndpointError::Rejected {
                endpoint: LOGIN_PATH.to_string(),
                status: response.status.as_u16(),
                kind,
            }
            .into());
        }

        let login: LoginResponse =
            response
                .json()
                .map_err(|e| EndpointError::InvalidResponse {
                    endpoint: LOGIN_PATH.to_string(),
                    reason: e.to_string(),
                })?;
        debug!(user_id = %login.user.id, role = %login.user.role, "login accepted");
        Ok(login)
    }

    /// Tells the backend to invalidate a refresh token.
    ///
    /// Callers treat this as best-effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails or the backend rejects it.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), Report<EndpointError>> {
        let response = self
            .post_json(LOGOUT_PATH, json!({ "refresh_token": refresh_token }))
            .await?;

        if !response.is_success() {
            return Err(EndpointError::Rejected {
                endpoint: LOGOUT_PATH.to_string(),
                status: response.status.as_u16(),
                kind: BackendErrorKind::from_response(&response),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl TokenEndpoint for AuthEndpoints {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        let response = self
            .post_json(REFRESH_PATH, json!({ "refresh": refresh_token }))
            .await
            .map_err(|e| RefreshError::Network {
                details: e.to_string(),
            })?;

        if !response.is_success() {
            warn!(
                status = %response.status,
                kind = %BackendErrorKind::from_response(&response),
                "refresh endpoint rejected request"
            );
            return Err(RefreshError::Server {
                status: response.status.as_u16(),
            });
        }

        response
            .json::<RefreshedTokens>()
            .map_err(|e| RefreshError::InvalidResponse {
                details: e.to_string(),
            })
    }
}

impl fmt::Debug for AuthEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthEndpoints")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

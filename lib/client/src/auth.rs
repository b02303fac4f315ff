//! Typed auth operations.
//!
//! Login and logout go through the unauthenticated endpoints and the
//! coordinator's write path; the account flows (profile, verification,
//! password reset) go through `ApiClient` like any other request. Only the
//! password reset pair is sent without a bearer, since its user is signed
//! out by definition.

use std::fmt;

use learnhub_session::endpoints::{
    PASSWORD_RESET_CONFIRM_PATH, PASSWORD_RESET_PATH, PROFILE_PATH, RESEND_VERIFICATION_PATH,
    VERIFY_EMAIL_PATH,
};
use learnhub_session::{
    ApiResponse, AuthEndpoints, BackendErrorKind, RefreshCoordinator, TokenPair, UserProfile,
};
use reqwest::Method;
use rootcause::prelude::Report;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::client::{ApiClient, RequestOptions};
use crate::error::AuthError;

/// Sign-in, sign-out and account operations.
#[derive(Clone)]
pub struct AuthClient {
    api: ApiClient,
    endpoints: AuthEndpoints,
}

impl AuthClient {
    /// Creates an auth client sharing `api`'s transport and coordinator.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let endpoints = AuthEndpoints::new(api.transport(), api.base().clone());
        Self { api, endpoints }
    }

    /// Returns the request wrapper.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn coordinator(&self) -> &RefreshCoordinator {
        self.api.coordinator()
    }

    /// Signs in and stores the new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the credentials (see
    /// [`AuthError::backend_kind`]) or the session cannot be stored.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, Report<AuthError>> {
        let login = self
            .endpoints
            .login(email, password)
            .await
            .map_err(|report| AuthError::from_endpoint("login", &report))?;

        self.coordinator()
            .store_session(&TokenPair::new(login.access, Some(login.refresh)))
            .map_err(|report| AuthError::Storage {
                details: report.to_string(),
            })?;
        info!(user_id = %login.user.id, role = %login.user.role, "signed in");
        Ok(login.user)
    }

    /// Signs out.
    ///
    /// The backend is told to invalidate the refresh token on a best-effort
    /// basis; local credentials are cleared whatever it answers.
    ///
    /// # Errors
    ///
    /// Returns an error only if local credentials could not be cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), Report<AuthError>> {
        if let Some(refresh) = self.coordinator().credentials().refresh_token() {
            if let Err(report) = self.endpoints.logout(&refresh).await {
                warn!(error = %report, "backend logout failed, clearing local session anyway");
            }
        }

        self.coordinator()
            .clear_tokens()
            .map_err(|report| AuthError::Storage {
                details: report.to_string(),
            })?;
        info!("signed out");
        Ok(())
    }

    /// Fetches the signed-in account's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the session has expired, or
    /// the body is not a profile.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<UserProfile, Report<AuthError>> {
        const OPERATION: &str = "profile";
        let response = self
            .api
            .get(PROFILE_PATH)
            .await
            .map_err(|report| AuthError::from_request(OPERATION, &report))?;
        ensure_success(OPERATION, &response)?;
        Ok(response
            .json::<UserProfile>()
            .map_err(|e| AuthError::InvalidResponse {
                operation: OPERATION,
                reason: e.to_string(),
            })?)
    }

    /// Confirms an email address with the token from the verification
    /// link.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the token.
    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> Result<(), Report<AuthError>> {
        self.post(
            "verify_email",
            VERIFY_EMAIL_PATH,
            json!({ "token": token }),
            false,
        )
        .await
    }

    /// Sends a new verification email.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the request.
    #[instrument(skip(self))]
    pub async fn resend_verification(&self, email: &str) -> Result<(), Report<AuthError>> {
        self.post(
            "resend_verification",
            RESEND_VERIFICATION_PATH,
            json!({ "email": email }),
            false,
        )
        .await
    }

    /// Starts a password reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the request.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), Report<AuthError>> {
        self.post(
            "request_password_reset",
            PASSWORD_RESET_PATH,
            json!({ "email": email }),
            true,
        )
        .await
    }

    /// Completes a password reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid or the password fails
    /// validation.
    #[instrument(skip_all)]
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), Report<AuthError>> {
        self.post(
            "confirm_password_reset",
            PASSWORD_RESET_CONFIRM_PATH,
            json!({ "token": token, "new_password": new_password }),
            true,
        )
        .await
    }

    async fn post(
        &self,
        operation: &'static str,
        path: &str,
        body: serde_json::Value,
        skip_auth: bool,
    ) -> Result<(), Report<AuthError>> {
        let options = RequestOptions::json(Method::POST, &body).map_err(|e| {
            AuthError::Unavailable {
                operation,
                details: e.to_string(),
            }
        })?;
        let response = self
            .api
            .request(path, options, skip_auth)
            .await
            .map_err(|report| AuthError::from_request(operation, &report))?;
        ensure_success(operation, &response)?;
        Ok(())
    }
}

fn ensure_success(operation: &'static str, response: &ApiResponse) -> Result<(), AuthError> {
    if response.is_success() {
        return Ok(());
    }
    Err(AuthError::Rejected {
        operation,
        status: response.status.as_u16(),
        kind: BackendErrorKind::from_response(response),
    })
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

//! Domain error types for server operations.
//!
//! - `StartupError`: the server could not be assembled from configuration
//! - `AuthError`: an auth route failed; renders as an HTTP response

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use learnhub_gate::RouteTableError;
use learnhub_session::{BackendErrorKind, ConfigError, EndpointError, RefreshError};
use rootcause::prelude::Report;
use serde_json::json;
use std::fmt;

/// Errors assembling application state.
#[derive(Debug)]
pub enum StartupError {
    /// Session settings are invalid.
    Session(ConfigError),
    /// The route table is inconsistent.
    Routes(RouteTableError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(e) => write!(f, "invalid session configuration: {e}"),
            Self::Routes(e) => write!(f, "invalid route table: {e}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Auth route errors.
#[derive(Debug)]
pub enum AuthError {
    /// No refresh token cookie on a refresh request.
    MissingRefreshToken,
    /// The backend rejected the call.
    Rejected { status: u16, kind: BackendErrorKind },
    /// The backend could not be reached or answered garbage.
    Upstream { details: String },
}

impl AuthError {
    pub(crate) fn from_endpoint(report: &Report<EndpointError>) -> Self {
        match report.current_context() {
            EndpointError::Rejected { status, kind, .. } => Self::Rejected {
                status: *status,
                kind: kind.clone(),
            },
            other => Self::Upstream {
                details: other.to_string(),
            },
        }
    }

    pub(crate) fn from_refresh(error: RefreshError) -> Self {
        match error {
            RefreshError::NoRefreshToken => Self::MissingRefreshToken,
            RefreshError::Server { status } => Self::Rejected {
                status,
                kind: BackendErrorKind::TokenNotValid,
            },
            other => Self::Upstream {
                details: other.to_string(),
            },
        }
    }

    /// Returns true when the refresh token is gone or refused, so the
    /// browser's credential cookies are dead.
    pub(crate) fn ends_session(&self) -> bool {
        match self {
            Self::MissingRefreshToken => true,
            Self::Rejected { .. } => self.status().is_client_error(),
            Self::Upstream { .. } => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::MissingRefreshToken => StatusCode::UNAUTHORIZED,
            // Backend 5xx is our upstream failing.
            Self::Rejected { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(StatusCode::is_client_error)
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRefreshToken => write!(f, "no refresh token"),
            Self::Rejected { status, kind } => {
                write!(f, "backend rejected request with status {status}: {kind}")
            }
            Self::Upstream { details } => write!(f, "backend unavailable: {details}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "auth request failed");
        } else {
            tracing::debug!(error = %self, "auth request rejected");
        }

        let message = match &self {
            Self::Rejected { kind, .. } => kind.to_string(),
            Self::MissingRefreshToken => "Not authenticated".to_string(),
            Self::Upstream { .. } => "Authentication service unavailable".to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

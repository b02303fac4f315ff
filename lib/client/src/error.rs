//! Error types for the client crate.

use learnhub_session::{BackendErrorKind, EndpointError, RefreshError, TransportError};
use rootcause::prelude::Report;
use std::fmt;

/// Errors from the authenticated request wrapper.
///
/// Non-2xx responses are not errors; they are returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request could not be built.
    InvalidRequest { reason: String },
    /// The transport failed before a response arrived.
    Transport { url: String, source: TransportError },
    /// A 401 could not be recovered because the refresh failed. The
    /// session has been cleared and sign-in navigation requested.
    RefreshFailed { source: RefreshError },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
            Self::Transport { url, source } => write!(f, "request to '{url}' failed: {source}"),
            Self::RefreshFailed { source } => {
                write!(f, "session could not be refreshed: {source}")
            }
        }
    }
}

impl std::error::Error for RequestError {}

/// Errors from typed auth operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The backend answered with an error status.
    Rejected {
        operation: &'static str,
        status: u16,
        kind: BackendErrorKind,
    },
    /// The backend could not be reached.
    Unavailable {
        operation: &'static str,
        details: String,
    },
    /// The backend answered 2xx with an unexpected body.
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
    /// The session expired and could not be refreshed.
    SessionExpired { operation: &'static str },
    /// Credentials could not be written or cleared.
    Storage { details: String },
}

impl AuthError {
    /// Returns the decoded backend error kind for rejections.
    #[must_use]
    pub fn backend_kind(&self) -> Option<&BackendErrorKind> {
        match self {
            Self::Rejected { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub(crate) fn from_request(operation: &'static str, report: &Report<RequestError>) -> Self {
        match report.current_context() {
            RequestError::RefreshFailed { .. } => Self::SessionExpired { operation },
            other => Self::Unavailable {
                operation,
                details: other.to_string(),
            },
        }
    }

    pub(crate) fn from_endpoint(operation: &'static str, report: &Report<EndpointError>) -> Self {
        match report.current_context() {
            EndpointError::Rejected { status, kind, .. } => Self::Rejected {
                operation,
                status: *status,
                kind: kind.clone(),
            },
            EndpointError::Transport { source, .. } => Self::Unavailable {
                operation,
                details: source.to_string(),
            },
            EndpointError::InvalidResponse { reason, .. } => Self::InvalidResponse {
                operation,
                reason: reason.clone(),
            },
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected {
                operation,
                status,
                kind,
            } => write!(f, "{operation} rejected ({status}): {kind}"),
            Self::Unavailable { operation, details } => {
                write!(f, "{operation} failed: {details}")
            }
            Self::InvalidResponse { operation, reason } => {
                write!(f, "{operation} returned an invalid response: {reason}")
            }
            Self::SessionExpired { operation } => {
                write!(f, "{operation} failed: session expired")
            }
            Self::Storage { details } => write!(f, "credential storage failed: {details}"),
        }
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_failure_maps_to_session_expired() {
        let report: Report<RequestError> = RequestError::RefreshFailed {
            source: RefreshError::NoRefreshToken,
        }
        .into();
        assert_eq!(
            AuthError::from_request("profile", &report),
            AuthError::SessionExpired {
                operation: "profile"
            }
        );
    }

    #[test]
    fn endpoint_rejection_keeps_kind() {
        let report: Report<EndpointError> = EndpointError::Rejected {
            endpoint: "users/login/".to_string(),
            status: 403,
            kind: BackendErrorKind::EmailNotVerified,
        }
        .into();
        let err = AuthError::from_endpoint("login", &report);
        assert_eq!(err.backend_kind(), Some(&BackendErrorKind::EmailNotVerified));
        assert!(err.to_string().contains("403"));
    }
}

//! Error types for the session crate.
//!
//! - `RefreshError`: outcome of a refresh operation, shared by every waiter
//! - `ClaimsError`: access token could not be decoded into claims
//! - `StorageError`: durable store failures
//! - `TransportError`: the HTTP transport could not complete a request
//! - `EndpointError`: a backend auth endpoint rejected or garbled a call
//! - `ConfigError`: invalid session configuration

use crate::endpoints::BackendErrorKind;
use std::fmt;

/// Errors from a token refresh operation.
///
/// The value is `Clone` because every caller joined to the same in-flight
/// refresh receives an identical copy of the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token is stored. Retrying cannot help.
    NoRefreshToken,
    /// The refresh endpoint answered with a non-success status.
    Server { status: u16 },
    /// The request never produced a response.
    Network { details: String },
    /// A single attempt exceeded the per-attempt timeout.
    Timeout { after_ms: u64 },
    /// The endpoint answered 2xx with a body that is not a token response.
    InvalidResponse { details: String },
    /// The new tokens could not be written to storage.
    Storage { details: String },
    /// Credentials were cleared while the refresh was running.
    SessionCleared,
    /// The refresh task died before settling.
    Interrupted { details: String },
}

impl RefreshError {
    /// Returns true for the network/server class of failures that the
    /// backoff schedule retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Server { .. }
                | Self::Network { .. }
                | Self::Timeout { .. }
                | Self::InvalidResponse { .. }
        )
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRefreshToken => write!(f, "no refresh token available"),
            Self::Server { status } => {
                write!(f, "refresh endpoint returned status {status}")
            }
            Self::Network { details } => write!(f, "refresh request failed: {details}"),
            Self::Timeout { after_ms } => {
                write!(f, "refresh attempt timed out after {after_ms}ms")
            }
            Self::InvalidResponse { details } => {
                write!(f, "invalid refresh response: {details}")
            }
            Self::Storage { details } => {
                write!(f, "failed to store refreshed tokens: {details}")
            }
            Self::SessionCleared => write!(f, "session was cleared during refresh"),
            Self::Interrupted { details } => write!(f, "refresh interrupted: {details}"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Errors from decoding an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    /// The token is not three dot-separated segments.
    MalformedToken,
    /// The payload segment is not valid base64url.
    InvalidEncoding { reason: String },
    /// The payload is not the expected JSON claims object.
    InvalidPayload { reason: String },
    /// A required claim is absent or empty.
    MissingClaim { claim: &'static str },
}

impl fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedToken => write!(f, "malformed token"),
            Self::InvalidEncoding { reason } => {
                write!(f, "token payload is not base64url: {reason}")
            }
            Self::InvalidPayload { reason } => write!(f, "invalid token payload: {reason}"),
            Self::MissingClaim { claim } => write!(f, "missing required claim: {claim}"),
        }
    }
}

impl std::error::Error for ClaimsError {}

/// Errors from the durable credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    Io { path: String, reason: String },
    /// The backing file does not contain a string map.
    Corrupt { path: String, reason: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "storage I/O error at '{path}': {reason}"),
            Self::Corrupt { path, reason } => {
                write!(f, "corrupt credential store '{path}': {reason}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// Errors from the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be built from its parts.
    InvalidRequest { reason: String },
    /// Connection or protocol failure.
    ConnectionFailed { reason: String },
    /// The transport's own timeout elapsed.
    Timeout,
    /// The response body could not be read.
    Body { reason: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
            Self::ConnectionFailed { reason } => write!(f, "connection failed: {reason}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Body { reason } => write!(f, "failed to read response body: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors from unauthenticated backend auth endpoints (login, logout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The transport failed before a response arrived.
    Transport { endpoint: String, source: TransportError },
    /// The backend answered with a non-success status.
    Rejected {
        endpoint: String,
        status: u16,
        kind: BackendErrorKind,
    },
    /// The backend answered 2xx with an unexpected body.
    InvalidResponse { endpoint: String, reason: String },
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { endpoint, source } => {
                write!(f, "request to '{endpoint}' failed: {source}")
            }
            Self::Rejected {
                endpoint,
                status,
                kind,
            } => write!(f, "'{endpoint}' rejected with status {status}: {kind}"),
            Self::InvalidResponse { endpoint, reason } => {
                write!(f, "invalid response from '{endpoint}': {reason}")
            }
        }
    }
}

impl std::error::Error for EndpointError {}

/// Errors from session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The API base URL does not parse.
    InvalidBaseUrl { url: String, reason: String },
    /// The durable store could not be opened.
    StorageUnavailable { reason: String },
    /// The HTTP client could not be constructed.
    HttpClient { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl { url, reason } => {
                write!(f, "invalid API base URL '{url}': {reason}")
            }
            Self::StorageUnavailable { reason } => {
                write!(f, "credential store unavailable: {reason}")
            }
            Self::HttpClient { reason } => write!(f, "failed to create HTTP client: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_error_retry_classes() {
        assert!(!RefreshError::NoRefreshToken.is_retryable());
        assert!(!RefreshError::SessionCleared.is_retryable());
        assert!(RefreshError::Server { status: 502 }.is_retryable());
        assert!(RefreshError::Timeout { after_ms: 5000 }.is_retryable());
        assert!(
            RefreshError::Network {
                details: "reset".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn refresh_error_display() {
        let err = RefreshError::Server { status: 503 };
        assert!(err.to_string().contains("503"));
        assert!(RefreshError::NoRefreshToken.to_string().contains("no refresh token"));
    }

    #[test]
    fn claims_error_missing_claim_display() {
        let err = ClaimsError::MissingClaim { claim: "role" };
        assert!(err.to_string().contains("role"));
    }

    #[test]
    fn endpoint_error_display() {
        let err = EndpointError::Rejected {
            endpoint: "users/login/".to_string(),
            status: 401,
            kind: BackendErrorKind::InvalidCredentials,
        };
        assert!(err.to_string().contains("users/login/"));
        assert!(err.to_string().contains("401"));
    }
}

//! Session state for the learnhub client.
//!
//! This crate provides:
//! - Access token claims decoding (`AccessClaims`) and roles (`Role`)
//! - Credential storage in a durable store mirrored into cookies
//!   (`CredentialStore`, `CookiePolicy`)
//! - The HTTP transport seam (`HttpTransport`) and backend auth endpoints
//! - The single-flight refresh coordinator (`RefreshCoordinator`)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use learnhub_session::{
//!     AuthEndpoints, ApiBase, CookiePolicy, CredentialStore, RefreshCoordinator,
//!     ReqwestTransport, TokenPair,
//! };
//!
//! let transport = Arc::new(ReqwestTransport::new(std::time::Duration::from_secs(5)).unwrap());
//! let base = ApiBase::parse("https://api.example.com/api").unwrap();
//! let coordinator = RefreshCoordinator::new(
//!     Arc::new(AuthEndpoints::new(transport, base)),
//!     CredentialStore::in_memory(CookiePolicy::default()),
//! );
//!
//! coordinator
//!     .store_session(&TokenPair::new("opaque", Some("refresh".to_string())))
//!     .unwrap();
//! // Opaque tokens never decode, so they never count as valid.
//! assert!(!coordinator.is_token_valid());
//! ```

pub mod claims;
pub mod config;
pub mod cookies;
pub mod coordinator;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod role;
pub mod storage;
pub mod transport;

pub use claims::AccessClaims;
pub use config::SessionConfig;
pub use cookies::{CookieMirror, CookiePolicy};
pub use coordinator::{RefreshCoordinator, RetryPolicy};
pub use credentials::{AccessToken, CredentialStore, TokenPair};
pub use endpoints::{
    AuthEndpoints, BackendErrorKind, LoginResponse, RefreshedTokens, TokenEndpoint, UserProfile,
};
pub use error::{
    ClaimsError, ConfigError, EndpointError, RefreshError, StorageError, TransportError,
};
pub use role::{Role, UnknownRole};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{ApiBase, ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};

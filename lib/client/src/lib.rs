//! Authenticated HTTP access to the learnhub backend.
//!
//! This crate provides:
//! - `ApiClient`, which attaches the bearer token and recovers from 401s
//!   through the shared refresh coordinator
//! - `AuthClient` for sign-in, sign-out and account flows
//! - The `Navigator` seam for sign-in redirects

pub mod auth;
pub mod client;
pub mod error;
pub mod navigator;

#[cfg(test)]
mod testing;

pub use auth::AuthClient;
pub use client::{ApiClient, RequestOptions};
pub use error::{AuthError, RequestError};
pub use navigator::{ChannelNavigator, Navigation, Navigator};

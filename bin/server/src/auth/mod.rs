//! Authentication module for the learnhub server.
//!
//! This module provides:
//! - The route gate middleware, evaluated against request cookies
//! - Login, refresh and logout routes that proxy the backend and write the
//!   same credential cookies the client mirrors
//!
//! The server never verifies token signatures. The gate only decides where
//! a navigation goes; the backend enforces authorization on every API call.

pub mod middleware;
pub mod routes;

use learnhub_core::Result;
use learnhub_gate::{RouteGate, RouteTable};
use learnhub_session::{AuthEndpoints, CookiePolicy, HttpTransport};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::StartupError;

pub use middleware::route_gate;
pub use routes::{login, logout, refresh};

/// Shared application state.
pub struct AppState {
    /// Route gate.
    pub gate: RouteGate,
    /// Backend auth endpoints.
    pub endpoints: AuthEndpoints,
    /// Attributes for cookies set by auth routes.
    pub cookies: CookiePolicy,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(gate: RouteGate, endpoints: AuthEndpoints, cookies: CookiePolicy) -> Self {
        Self {
            gate,
            endpoints,
            cookies,
        }
    }

    /// Builds state from configuration with the standard route table.
    ///
    /// # Errors
    ///
    /// Returns an error if the API base URL is invalid or the route table
    /// does not build.
    pub fn from_config(
        config: &ServerConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, StartupError> {
        let base = config
            .session
            .api_base()
            .map_err(|report| StartupError::Session(report.current_context().clone()))?;
        let routes = RouteTable::standard()
            .map_err(|report| StartupError::Routes(report.current_context().clone()))?;
        Ok(Self::new(
            RouteGate::new(routes, config.gate.clone()),
            AuthEndpoints::new(transport, base),
            config.session.cookie_policy(),
        ))
    }
}

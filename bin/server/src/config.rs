//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.
//!
//! Nested sections use `__` as the separator, e.g.
//! `SESSION__API_BASE_URL=https://api.example.com/api` or
//! `GATE__TOLERANCE_SECS=30`.

use learnhub_gate::GateConfig;
use learnhub_session::SessionConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Backend API, cookie and refresh settings.
    pub session: SessionConfig,

    /// Route gate settings.
    #[serde(default)]
    pub gate: GateConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

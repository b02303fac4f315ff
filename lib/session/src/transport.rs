//! HTTP transport seam.
//!
//! Every backend call goes through `HttpTransport`, so the refresh
//! coordinator and the request wrapper can be exercised against a scripted
//! transport. `ReqwestTransport` is the production implementation.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::error::{ConfigError, TransportError};

/// Base URL of the backend API.
///
/// Always stored with a trailing slash so relative paths join beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase(Url);

impl ApiBase {
    /// Parses a base URL such as `https://api.example.com/api`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or cannot be a base.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut url = Url::parse(raw).map_err(|e| ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                url: raw.to_string(),
                reason: "URL cannot be a base".to_string(),
            });
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self(url))
    }

    /// Resolves `target` against the base.
    ///
    /// Absolute URLs pass through unchanged; relative paths (with or
    /// without a leading slash) are placed under the base path.
    #[must_use]
    pub fn resolve(&self, target: &str) -> String {
        if let Ok(absolute) = Url::parse(target) {
            return absolute.to_string();
        }
        match self.0.join(target.trim_start_matches('/')) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.0, target.trim_start_matches('/')),
        }
    }

    /// Returns the base URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// A fully-resolved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<String>,
}

impl ApiRequest {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets a JSON body and the matching content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, TransportError> {
        let json = serde_json::to_string(body).map_err(|e| TransportError::InvalidRequest {
            reason: e.to_string(),
        })?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(json);
        Ok(self)
    }

    /// Replaces the `Authorization` header with a bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token contains bytes not allowed in headers.
    pub fn set_bearer(&mut self, token: &str) -> Result<(), TransportError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            TransportError::InvalidRequest {
                reason: e.to_string(),
            }
        })?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Returns the bearer token currently attached, if any.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

/// A response with its body fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a response without headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    #[must_use]
    pub fn json_body(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, value.to_string());
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true for 401.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Trait for sending HTTP requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and reads the whole response.
    ///
    /// Non-2xx statuses are responses, not errors.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// `HttpTransport` over a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with an overall per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::ConnectionFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| TransportError::Body {
            reason: e.to_string(),
        })?;

        Ok(ApiResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

//! Test doubles shared by the client tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use learnhub_core::UserId;
use learnhub_session::endpoints::REFRESH_PATH;
use learnhub_session::{
    AccessClaims, ApiBase, ApiRequest, ApiResponse, AuthEndpoints, CookiePolicy, CredentialStore,
    HttpTransport, RefreshCoordinator, Role, TokenPair, TransportError,
};
use tokio::sync::mpsc;

use crate::client::ApiClient;
use crate::navigator::{ChannelNavigator, Navigation};

pub(crate) const BASE: &str = "https://api.example.com/api/";

/// Path of a request relative to [`BASE`].
pub(crate) trait RequestExt {
    fn path(&self) -> &str;
}

impl RequestExt for ApiRequest {
    fn path(&self) -> &str {
        self.url.strip_prefix(BASE).unwrap_or(&self.url)
    }
}

type Handler = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// Backend answering through a closure and logging every request.
pub(crate) struct FakeBackend {
    handler: Handler,
    refresh_delay: Duration,
    log: Mutex<Vec<ApiRequest>>,
}

impl FakeBackend {
    pub(crate) fn new(
        handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_refresh_delay(handler, Duration::ZERO)
    }

    pub(crate) fn with_refresh_delay(
        handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
        refresh_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            refresh_delay,
            log: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().expect("lock").clone()
    }

    pub(crate) fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.log.lock().expect("lock").push(request.clone());
        if request.path() == REFRESH_PATH && !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        Ok((self.handler)(&request))
    }
}

/// Credentials holding an opaque access token and refresh token `r-1`.
pub(crate) fn opaque_session(access: &str) -> CredentialStore {
    let credentials = CredentialStore::in_memory(CookiePolicy::default());
    credentials
        .store(&TokenPair::new(access, Some("r-1".to_string())))
        .expect("store");
    credentials
}

pub(crate) fn token_expiring_in(secs: i64) -> String {
    AccessClaims {
        user_id: UserId::new(11),
        email: "learner@example.com".to_string(),
        role: Role::Student,
        name: Some("Learner".to_string()),
        issued_at: None,
        expires_at: Utc::now().timestamp() + secs,
    }
    .to_unsigned_token()
}

pub(crate) fn client_with(
    backend: Arc<FakeBackend>,
    credentials: CredentialStore,
) -> (ApiClient, mpsc::UnboundedReceiver<Navigation>) {
    let base = ApiBase::parse(BASE).expect("base");
    let transport: Arc<dyn HttpTransport> = backend;
    let coordinator = RefreshCoordinator::new(
        Arc::new(AuthEndpoints::new(Arc::clone(&transport), base.clone())),
        credentials,
    );
    let (navigator, rx) = ChannelNavigator::new();
    (
        ApiClient::new(coordinator, transport, base, Arc::new(navigator)),
        rx,
    )
}

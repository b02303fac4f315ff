//! Route gate middleware for Axum.

use axum::{
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use learnhub_gate::{GateDecision, GateRequest};
use learnhub_session::Role;
use learnhub_session::cookies::{
    ACCESS_TOKEN_COOKIE, AUTH_STATE_AUTHENTICATED, AUTH_STATE_COOKIE, REFRESH_TOKEN_COOKIE,
    USER_ROLE_COOKIE,
};
use std::sync::Arc;
use tracing::debug;

use super::AppState;

/// Evaluates the route gate before the request reaches a handler.
///
/// Redirect decisions short-circuit. Otherwise the decision is inserted as
/// a request extension so the page handler can tell the client whether to
/// refresh before rendering.
pub async fn route_gate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let gate_request = gate_request(request.uri(), &jar);
    match state.gate.evaluate(&gate_request, Utc::now()) {
        GateDecision::Redirect { location, reason } => {
            debug!(path = %request.uri().path(), ?reason, %location, "gate redirect");
            Redirect::to(&location).into_response()
        }
        decision => {
            request.extensions_mut().insert(decision);
            next.run(request).await
        }
    }
}

/// Reads gate input from the request target and credential cookies.
pub(crate) fn gate_request(uri: &Uri, jar: &CookieJar) -> GateRequest {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());
    let mut request = GateRequest::new(target);

    let present = |name: &str| jar.get(name).filter(|c| !c.value().is_empty());

    if let Some(token) = present(ACCESS_TOKEN_COOKIE) {
        request = request.with_access_token(token.value());
    }
    if present(REFRESH_TOKEN_COOKIE).is_some() {
        request = request.with_refresh_token();
    }
    if present(AUTH_STATE_COOKIE).is_some_and(|c| c.value() == AUTH_STATE_AUTHENTICATED) {
        let role = present(USER_ROLE_COOKIE).and_then(|c| c.value().parse::<Role>().ok());
        request = request.with_session_marker(role);
    }
    request
}

//! learnhub web server.
//!
//! Hosts the route gate as middleware in front of the client shell, plus
//! cookie-writing auth routes under `/auth`.

pub mod auth;
pub mod config;
pub mod error;

use axum::{
    Router,
    extract::Request,
    middleware,
    response::Html,
    routing::{get, post},
};
use learnhub_gate::GateDecision;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use auth::AppState;

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", get(auth::logout))
        .fallback(shell)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::route_gate,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the client shell for every page the gate lets through.
///
/// `data-session` tells the client to refresh before rendering when the
/// gate allowed the page on the strength of a refresh token alone.
async fn shell(request: Request) -> Html<&'static str> {
    match request.extensions().get::<GateDecision>() {
        Some(GateDecision::AllowPendingRefresh) => Html(SHELL_PENDING_REFRESH),
        _ => Html(SHELL_READY),
    }
}

const SHELL_READY: &str = r#"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8"/>
        <meta name="viewport" content="width=device-width, initial-scale=1"/>
        <script type="module" src="/pkg/learnhub.js"></script>
    </head>
    <body data-session="ready"></body>
</html>
"#;

const SHELL_PENDING_REFRESH: &str = r#"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8"/>
        <meta name="viewport" content="width=device-width, initial-scale=1"/>
        <script type="module" src="/pkg/learnhub.js"></script>
    </head>
    <body data-session="pending-refresh"></body>
</html>
"#;

//! Authentication routes for login, refresh, and logout.
//!
//! Each route proxies the backend and answers with `Set-Cookie` headers for
//! the same four cookies the client mirrors, so a session started here is
//! visible to the gate on the very next navigation.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use learnhub_session::cookies::{CREDENTIAL_COOKIES, REFRESH_TOKEN_COOKIE};
use learnhub_session::{AccessClaims, CookiePolicy, TokenEndpoint, UserProfile};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::AppState;
use crate::error::AuthError;

/// Sign-in form.
#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

fn refresh_cookie_value(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Signs in against the backend and sets the credential cookies.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(form): Json<LoginForm>,
) -> Result<(CookieJar, Json<UserProfile>), AuthError> {
    let login = state
        .endpoints
        .login(&form.email, &form.password)
        .await
        .map_err(|report| AuthError::from_endpoint(&report))?;

    let cookies = &state.cookies;
    let jar = jar
        .add(cookies.access_cookie(&login.access))
        .add(cookies.refresh_cookie(&login.refresh))
        .add(cookies.session_marker_cookie())
        .add(cookies.role_cookie(login.user.role));

    info!(user_id = %login.user.id, role = %login.user.role, "signed in");
    Ok((jar, Json(login.user)))
}

/// Exchanges the refresh token cookie for a new access token cookie.
///
/// One attempt only; the client coordinator owns retries. A missing or
/// rejected refresh token removes every credential cookie so the gate stops
/// treating the browser as recoverable.
#[instrument(skip_all)]
pub async fn refresh(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(refresh_token) = refresh_cookie_value(&jar) else {
        return (clear_credentials(jar), AuthError::MissingRefreshToken).into_response();
    };
    let tokens = match state.endpoints.refresh(&refresh_token).await {
        Ok(tokens) => tokens,
        Err(err) => {
            let error = AuthError::from_refresh(err);
            if error.ends_session() {
                return (clear_credentials(jar), error).into_response();
            }
            return error.into_response();
        }
    };

    let cookies = &state.cookies;
    let mut jar = jar.add(cookies.access_cookie(&tokens.access));
    if let Some(rotated) = &tokens.refresh {
        jar = jar.add(cookies.refresh_cookie(rotated));
    }
    if let Some(claims) = AccessClaims::read(&tokens.access) {
        jar = jar
            .add(cookies.session_marker_cookie())
            .add(cookies.role_cookie(claims.role));
    }

    info!(rotated = tokens.refresh.is_some(), "access token refreshed");
    (jar, StatusCode::NO_CONTENT).into_response()
}

fn clear_credentials(jar: CookieJar) -> CookieJar {
    CREDENTIAL_COOKIES
        .into_iter()
        .fold(jar, |jar, name| jar.add(CookiePolicy::removal(name)))
}

/// Logs out: best-effort backend invalidation, then clears every
/// credential cookie and sends the user to sign-in.
#[instrument(skip_all)]
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(refresh_token) = refresh_cookie_value(&jar) {
        if let Err(report) = state.endpoints.logout(&refresh_token).await {
            warn!(error = %report, "backend logout failed, clearing cookies anyway");
        }
    }

    (
        clear_credentials(jar),
        Redirect::to(&state.gate.config().sign_in_path),
    )
}

//! The per-navigation access decision.
//!
//! `RouteGate::evaluate` is pure: it looks at the path, whatever token state
//! the caller could read (normally request cookies) and the current time,
//! and decides whether to render, render and let the client refresh, or
//! redirect.
//!
//! Role checks only run on a token that decodes and is still valid, or,
//! when no access token is readable at all, on the `user_role` cookie that
//! accompanies the `auth_state` session marker. An expired or undecodable
//! token never reaches the role check.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use learnhub_session::{AccessClaims, Role};
use tracing::debug;

use crate::config::GateConfig;
use crate::routes::{RouteAccess, RouteTable};

/// What the gate knows about one navigation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GateRequest {
    /// Requested path.
    pub path: String,
    /// Raw query string, without `?`.
    pub query: Option<String>,
    /// Access token, if readable.
    pub access_token: Option<String>,
    /// Whether a refresh token is present.
    pub has_refresh_token: bool,
    /// Whether the `auth_state=authenticated` marker is present.
    pub session_marker: bool,
    /// Role from the `user_role` cookie.
    pub role_hint: Option<Role>,
}

impl GateRequest {
    /// Creates a request for `target`, a path with an optional query.
    #[must_use]
    pub fn new(target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        Self {
            path: path.to_string(),
            query: query.filter(|q| !q.is_empty()),
            ..Self::default()
        }
    }

    /// Sets the access token.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Marks a refresh token as present.
    #[must_use]
    pub fn with_refresh_token(mut self) -> Self {
        self.has_refresh_token = true;
        self
    }

    /// Marks the session marker as present, with an optional role cookie.
    #[must_use]
    pub fn with_session_marker(mut self, role: Option<Role>) -> Self {
        self.session_marker = true;
        self.role_hint = role;
        self
    }

    fn target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }
}

impl fmt::Debug for GateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateRequest")
            .field("path", &self.path)
            .field("query", &self.query)
            .field("access_token", &self.access_token.as_ref().map(|_| ".."))
            .field("has_refresh_token", &self.has_refresh_token)
            .field("session_marker", &self.session_marker)
            .field("role_hint", &self.role_hint)
            .finish()
    }
}

/// Why the gate redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    /// A signed-in user asked for sign-in or sign-up.
    AlreadyAuthenticated,
    /// The route needs a different role.
    RoleMismatch { required: Role, actual: Role },
    /// No session at all.
    SignInRequired,
    /// A later step of a multi-step flow without a session.
    FlowRestart,
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Render the page.
    Allow,
    /// Render the page; the access token is missing or expired but the
    /// session can still be refreshed client-side.
    AllowPendingRefresh,
    /// Send the browser elsewhere.
    Redirect {
        location: String,
        reason: RedirectReason,
    },
}

/// The session as far as the gate can tell.
enum SessionView {
    /// A valid token, or the role cookie when no token is readable.
    Known(Role),
    /// Not known to be valid, but the client may still recover it.
    Recoverable,
    Anonymous,
}

/// Route access gate.
#[derive(Debug, Clone)]
pub struct RouteGate {
    routes: RouteTable,
    config: GateConfig,
}

impl RouteGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(routes: RouteTable, config: GateConfig) -> Self {
        Self { routes, config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Returns the route table.
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decides a navigation at `now`.
    #[must_use]
    pub fn evaluate(&self, request: &GateRequest, now: DateTime<Utc>) -> GateDecision {
        let access = self.routes.classify(&request.path);
        let session = self.session(request, now);

        let decision = match (access, session) {
            (RouteAccess::Public, _) => GateDecision::Allow,
            (RouteAccess::AuthEntry, SessionView::Known(role)) => GateDecision::Redirect {
                location: self.config.landing(role).to_string(),
                reason: RedirectReason::AlreadyAuthenticated,
            },
            (RouteAccess::AuthEntry, _) => GateDecision::Allow,
            (RouteAccess::Role(required), SessionView::Known(actual)) if required != actual => {
                GateDecision::Redirect {
                    location: self.config.landing(actual).to_string(),
                    reason: RedirectReason::RoleMismatch { required, actual },
                }
            }
            (_, SessionView::Known(_)) => GateDecision::Allow,
            (_, SessionView::Recoverable) => GateDecision::AllowPendingRefresh,
            (_, SessionView::Anonymous) => self.anonymous_redirect(request),
        };

        debug!(path = %request.path, ?access, ?decision, "gate decision");
        decision
    }

    fn session(&self, request: &GateRequest, now: DateTime<Utc>) -> SessionView {
        let tolerance = Duration::seconds(self.config.tolerance_secs);
        match &request.access_token {
            Some(token) => {
                if let Some(claims) = AccessClaims::read(token)
                    .filter(|claims| claims.is_valid_with_tolerance(now, tolerance))
                {
                    return SessionView::Known(claims.role);
                }
            }
            None => {
                if let (true, Some(role)) = (request.session_marker, request.role_hint) {
                    return SessionView::Known(role);
                }
            }
        }

        if request.has_refresh_token || request.session_marker {
            SessionView::Recoverable
        } else {
            SessionView::Anonymous
        }
    }

    fn anonymous_redirect(&self, request: &GateRequest) -> GateDecision {
        if let (Some(flow), Some(query)) =
            (self.routes.flow_for(&request.path), request.query.as_deref())
        {
            if flow.step(query).is_some_and(|step| step > 1) {
                return GateDecision::Redirect {
                    location: format!("{}?{}", request.path, flow.first_step_query(query)),
                    reason: RedirectReason::FlowRestart,
                };
            }
        }

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(&self.config.redirect_param, &request.target())
            .finish();
        GateDecision::Redirect {
            location: format!("{}?{query}", self.config.sign_in_path),
            reason: RedirectReason::SignInRequired,
        }
    }
}

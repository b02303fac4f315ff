//! Route classification.
//!
//! A `RouteTable` partitions paths into public, auth-entry, role-gated and
//! any-authenticated routes. Patterns are either exact paths or `/prefix/*`
//! wildcards that match the prefix itself and anything below it, by whole
//! path segment (`/teacher/*` matches `/teacher/x` but not `/teachers`).
//!
//! Construction rejects tables where one concrete path could fall under two
//! different protected classifications. Paths no pattern covers are public.

use learnhub_core::Result;
use learnhub_session::Role;

use crate::error::RouteTableError;

/// Who may navigate to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Anyone.
    Public,
    /// Anyone; signed-in users are sent to their landing page instead
    /// (sign-in, sign-up).
    AuthEntry,
    /// Only the given role.
    Role(Role),
    /// Any signed-in user.
    Authenticated,
}

impl RouteAccess {
    /// Returns true for classifications that need a session.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Role(_) | Self::Authenticated)
    }
}

/// A path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    /// Matches one path (ignoring a trailing slash).
    Exact(String),
    /// Matches a path and everything beneath it.
    Prefix(String),
}

impl RoutePattern {
    /// Parses `/path` or `/path/*`.
    ///
    /// # Errors
    ///
    /// Returns an error for relative patterns or a misplaced `*`.
    pub fn parse(pattern: &str) -> std::result::Result<Self, RouteTableError> {
        let invalid = |reason: &str| RouteTableError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        if let Some(prefix) = pattern.strip_suffix("/*") {
            if prefix.contains('*') {
                return Err(invalid("'*' is only allowed as the last segment"));
            }
            return Ok(Self::Prefix(normalize(prefix).to_string()));
        }

        if pattern.contains('*') {
            return Err(invalid("'*' is only allowed as the last segment"));
        }
        Ok(Self::Exact(normalize(pattern).to_string()))
    }

    /// Returns true if `path` falls under this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        match self {
            Self::Exact(exact) => path == exact,
            Self::Prefix(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    /// Returns true if some concrete path matches both patterns.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::Exact(path), prefix @ Self::Prefix(_))
            | (prefix @ Self::Prefix(_), Self::Exact(path)) => prefix.matches(path),
            (Self::Prefix(a), Self::Prefix(b)) => self.matches(b) || other.matches(a),
        }
    }

    fn as_pattern(&self) -> String {
        match self {
            Self::Exact(path) => path.clone(),
            Self::Prefix(prefix) => format!("{prefix}/*"),
        }
    }
}

/// Strips a trailing slash, keeping `/` itself.
fn normalize(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some("") | None => path,
        Some(trimmed) => trimmed,
    }
}

/// A numbered multi-step flow such as checkout.
///
/// A later step requested without any session is sent back to step 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiStepFlow {
    pattern: RoutePattern,
    step_param: String,
}

impl MultiStepFlow {
    /// Returns the step number requested by `query`, if present and
    /// numeric.
    #[must_use]
    pub fn step(&self, query: &str) -> Option<u32> {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == self.step_param.as_str())
            .and_then(|(_, value)| value.parse().ok())
    }

    /// Returns true if `path` belongs to this flow.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }

    /// Rewrites `query` to point at step 1, keeping every other parameter
    /// in order.
    #[must_use]
    pub fn first_step_query(&self, query: &str) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        let mut replaced = false;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == self.step_param.as_str() {
                if !replaced {
                    serializer.append_pair(&key, "1");
                    replaced = true;
                }
            } else {
                serializer.append_pair(&key, &value);
            }
        }
        if !replaced {
            serializer.append_pair(&self.step_param, "1");
        }
        serializer.finish()
    }
}

/// Static route classification.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<(RoutePattern, RouteAccess)>,
    flows: Vec<MultiStepFlow>,
}

impl RouteTable {
    /// Starts building a table.
    #[must_use]
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// The learnhub route layout.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the layout is validated like any other.
    pub fn standard() -> Result<Self, RouteTableError> {
        Self::builder()
            .public("/")
            .public("/courses/*")
            .public("/about")
            .public("/forgot-password")
            .public("/reset-password/*")
            .public("/verify-email/*")
            .auth_entry("/sign-in")
            .auth_entry("/sign-up")
            .role("/dashboard/*", Role::Student)
            .role("/learn/*", Role::Student)
            .role("/teacher/*", Role::Teacher)
            .role("/admin/*", Role::Admin)
            .authenticated("/profile/*")
            .authenticated("/settings/*")
            .authenticated("/checkout/*")
            .flow("/checkout", "step")
            .build()
    }

    /// Classifies a path.
    ///
    /// Protected classifications win over public ones; auth-entry wins over
    /// plain public; anything unmatched is public.
    #[must_use]
    pub fn classify(&self, path: &str) -> RouteAccess {
        let mut access = RouteAccess::Public;
        for (pattern, candidate) in &self.routes {
            if !pattern.matches(path) {
                continue;
            }
            if candidate.is_protected() {
                return *candidate;
            }
            if *candidate == RouteAccess::AuthEntry {
                access = RouteAccess::AuthEntry;
            }
        }
        access
    }

    /// Returns the multi-step flow `path` belongs to.
    #[must_use]
    pub fn flow_for(&self, path: &str) -> Option<&MultiStepFlow> {
        self.flows.iter().find(|flow| flow.matches(path))
    }
}

/// Builder for [`RouteTable`]. Patterns are validated in [`Self::build`].
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    routes: Vec<(String, RouteAccess)>,
    flows: Vec<(String, String)>,
}

impl RouteTableBuilder {
    /// Adds a route.
    #[must_use]
    pub fn route(mut self, pattern: &str, access: RouteAccess) -> Self {
        self.routes.push((pattern.to_string(), access));
        self
    }

    /// Adds a public route.
    #[must_use]
    pub fn public(self, pattern: &str) -> Self {
        self.route(pattern, RouteAccess::Public)
    }

    /// Adds an auth-entry route.
    #[must_use]
    pub fn auth_entry(self, pattern: &str) -> Self {
        self.route(pattern, RouteAccess::AuthEntry)
    }

    /// Adds a role-gated route.
    #[must_use]
    pub fn role(self, pattern: &str, role: Role) -> Self {
        self.route(pattern, RouteAccess::Role(role))
    }

    /// Adds a route open to any signed-in user.
    #[must_use]
    pub fn authenticated(self, pattern: &str) -> Self {
        self.route(pattern, RouteAccess::Authenticated)
    }

    /// Adds a multi-step flow at `pattern` whose step number is carried in
    /// the `step_param` query parameter.
    #[must_use]
    pub fn flow(mut self, pattern: &str, step_param: &str) -> Self {
        self.flows.push((pattern.to_string(), step_param.to_string()));
        self
    }

    /// Validates and builds the table.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed patterns, overlapping protected
    /// patterns with different access, or flows without a step parameter.
    pub fn build(self) -> Result<RouteTable, RouteTableError> {
        let mut routes: Vec<(RoutePattern, RouteAccess)> = Vec::with_capacity(self.routes.len());
        for (raw, access) in self.routes {
            let pattern = RoutePattern::parse(&raw)?;
            if access.is_protected() {
                let conflict = routes.iter().find(|(existing, existing_access)| {
                    existing_access.is_protected()
                        && *existing_access != access
                        && existing.overlaps(&pattern)
                });
                if let Some((existing, _)) = conflict {
                    return Err(RouteTableError::Conflict {
                        first: existing.as_pattern(),
                        second: raw,
                    }
                    .into());
                }
            }
            routes.push((pattern, access));
        }

        let mut flows = Vec::with_capacity(self.flows.len());
        for (raw, step_param) in self.flows {
            if step_param.is_empty() {
                return Err(RouteTableError::InvalidFlow {
                    path: raw,
                    reason: "step parameter is empty".to_string(),
                }
                .into());
            }
            flows.push(MultiStepFlow {
                pattern: RoutePattern::parse(&raw)?,
                step_param,
            });
        }

        Ok(RouteTable { routes, flows })
    }
}

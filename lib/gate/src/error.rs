//! Error types for route table construction.

use std::fmt;

/// Errors from building a `RouteTable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTableError {
    /// A pattern is not an absolute path, or uses `*` anywhere but as a
    /// trailing `/*` segment.
    InvalidPattern { pattern: String, reason: String },
    /// Two patterns overlap with different protected classifications.
    Conflict { first: String, second: String },
    /// A multi-step flow has an empty step parameter.
    InvalidFlow { path: String, reason: String },
}

impl fmt::Display for RouteTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "invalid route pattern '{pattern}': {reason}")
            }
            Self::Conflict { first, second } => write!(
                f,
                "route patterns '{first}' and '{second}' overlap with different access"
            ),
            Self::InvalidFlow { path, reason } => {
                write!(f, "invalid multi-step flow '{path}': {reason}")
            }
        }
    }
}

impl std::error::Error for RouteTableError {}

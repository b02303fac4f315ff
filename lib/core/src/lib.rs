//! Core types shared by the learnhub session crates.
//!
//! This crate provides the `Result` alias used at crate boundaries and the
//! identifiers the backend hands out for its users.

pub mod id;

pub use id::{ParseIdError, UserId};

/// Result with a rootcause `Report` carrying a domain error context `C`.
///
/// Errors cross crate boundaries as `Report<C>`; callers that need the
/// typed error read it back with `current_context()`.
pub type Result<T, C = ()> = std::result::Result<T, rootcause::Report<C>>;

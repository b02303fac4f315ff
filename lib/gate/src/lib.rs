//! Route access gate for learnhub.
//!
//! This crate provides:
//! - Route classification (`RouteTable`, `RouteAccess`, `MultiStepFlow`)
//! - The per-navigation decision (`RouteGate::evaluate`)
//! - Gate configuration (`GateConfig`)
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use learnhub_gate::{GateConfig, GateDecision, GateRequest, RouteGate, RouteTable};
//!
//! let gate = RouteGate::new(RouteTable::standard().unwrap(), GateConfig::default());
//!
//! let decision = gate.evaluate(&GateRequest::new("/dashboard"), Utc::now());
//! assert!(matches!(decision, GateDecision::Redirect { .. }));
//!
//! let decision = gate.evaluate(
//!     &GateRequest::new("/dashboard").with_refresh_token(),
//!     Utc::now(),
//! );
//! assert_eq!(decision, GateDecision::AllowPendingRefresh);
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod routes;

pub use config::GateConfig;
pub use error::RouteTableError;
pub use gate::{GateDecision, GateRequest, RedirectReason, RouteGate};
pub use routes::{MultiStepFlow, RouteAccess, RoutePattern, RouteTable, RouteTableBuilder};

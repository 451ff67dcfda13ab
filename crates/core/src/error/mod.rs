//! # Error Handling Framework
//!
//! Structured error management for the identity platform, built around a
//! fixed taxonomy rather than an open-ended code list.
//!
//! ## Core Features
//!
//! - **Fixed Taxonomy**: a closed `ErrorKind` enum callers match on directly
//! - **Rich Context**: request context and error metadata for debugging
//! - **Severity Classification**: per-kind default severity, overridable per-error
//! - **Metrics Integration**: error tracking and monitoring capabilities
//!
//! ## Propagation Policy
//!
//! - `unauthenticated` / `permission_denied` / `precondition_failed` are
//!   security-relevant: the public message is always generic, full detail
//!   goes only to the audit trail.
//! - `dependency_unavailable` marks failures of optional collaborators
//!   (attestation metadata lookups, anomaly scorers); callers may degrade
//!   gracefully instead of failing the whole operation.
//! - `integrity_violation` is always fatal to the operation that surfaces it.
//!
//! ## Usage Examples
//!
//! ```rust
//! use iam_core::error::{Error, Result};
//!
//! fn validate_email(email: &str) -> Result<()> {
//!     if !email.contains('@') {
//!         return Err(Error::invalid_input("invalid email format"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod framework;
pub mod kind;
pub mod metrics;

pub use context::{ErrorContext, RequestContext};
pub use framework::{Error, ErrorCategory, ErrorSeverity, Result};
pub use kind::ErrorKind;
pub use metrics::ErrorMetrics;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed error taxonomy surfaced by every public operation.
///
/// Kinds, not type names: callers match on `ErrorKind`, never on a numbered
/// code. Adding a new kind is a breaking change to every caller and should be
/// rare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    /// Uniqueness violation (duplicate email, duplicate identity key, ...).
    Conflict,
    Unauthenticated,
    PermissionDenied,
    /// Refused because a precondition the caller should have checked does
    /// not hold: counter rollback, verification-level regression, etc.
    PreconditionFailed,
    RateLimited,
    /// Hash or chain mismatch detected during integrity verification. Always
    /// fatal to the operation that surfaces it.
    IntegrityViolation,
    /// An optional collaborator (attestation metadata service, anomaly
    /// scorer) did not respond in time or errored.
    DependencyUnavailable,
    Internal,
}

impl ErrorKind {
    /// Whether this kind is security-relevant: its public message must be
    /// generic and its audit trail must carry full detail (see the
    /// propagation policy).
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            ErrorKind::Unauthenticated
                | ErrorKind::PermissionDenied
                | ErrorKind::PreconditionFailed
        )
    }

    /// Default severity for this kind, overridable per-error via
    /// [`Error::with_severity`](super::Error::with_severity).
    pub fn default_severity(&self) -> super::ErrorSeverity {
        use super::ErrorSeverity::*;
        match self {
            ErrorKind::InvalidInput | ErrorKind::NotFound => Low,
            ErrorKind::Conflict | ErrorKind::RateLimited => Medium,
            ErrorKind::Unauthenticated
            | ErrorKind::PermissionDenied
            | ErrorKind::DependencyUnavailable => High,
            ErrorKind::PreconditionFailed | ErrorKind::IntegrityViolation => Critical,
            ErrorKind::Internal => Critical,
        }
    }

    /// Whether operations failing with this kind are safe to retry
    /// automatically. Per the propagation policy, only idempotent calls to
    /// optional collaborators retry; everything else (counter updates, audit
    /// appends, session mutations) never does.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::DependencyUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

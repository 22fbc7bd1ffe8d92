//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere. None of
/// these are retryable without changing the input; only `Conflict` benefits
/// from a caller-driven reload-and-retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive price or quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A status action is not valid from the current state.
    ///
    /// `allowed` lists the actions that *are* valid next, so callers can
    /// surface them verbatim.
    #[error("action '{action}' not allowed from status '{from}' (valid: {allowed:?})")]
    TransitionRejected {
        action: String,
        from: String,
        allowed: Vec<String>,
    },

    /// No conversion rate is available for a required currency pair/date.
    ///
    /// Fails closed: no partial totals may be produced or persisted.
    #[error("no conversion rate available: {0}")]
    RateUnavailable(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn transition_rejected(
        action: impl Into<String>,
        from: impl Into<String>,
        allowed: Vec<String>,
    ) -> Self {
        Self::TransitionRejected {
            action: action.into(),
            from: from.into(),
            allowed,
        }
    }

    pub fn rate_unavailable(msg: impl Into<String>) -> Self {
        Self::RateUnavailable(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

//! Shared error taxonomy for the transactional spine.
//!
//! Every component (Params, Identity, Reputation, Order+Escrow, Logistics,
//! Trust, Governance) returns this single [`Error`] type so that callers at
//! the edge of the core (an HTTP layer, a CLI, a test harness) can map a
//! failure to a response without knowing which component produced it.

use thiserror::Error;

/// A taxonomy of failure kinds, not of concrete type names — every
/// component maps its own failures into one of these variants.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("system paused")]
    SystemPaused,

    #[error("upstream timeout calling {0}")]
    UpstreamTimeout(String),

    #[error("upstream error calling {port}: {reason}")]
    UpstreamError { port: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn unauthorized(what: impl Into<String>) -> Self {
        Error::Unauthorized(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Error::Forbidden(what.into())
    }

    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Error::Conflict(what.into())
    }

    pub fn expired(what: impl Into<String>) -> Self {
        Error::Expired(what.into())
    }

    /// Stable error code for API responses, independent of the Display message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::InvalidInput { .. } => "INVALID_INPUT",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::Conflict(_) => "CONFLICT",
            Error::Expired(_) => "EXPIRED",
            Error::SystemPaused => "SYSTEM_PAUSED",
            Error::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            Error::UpstreamError { .. } => "UPSTREAM_ERROR",
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Suggested HTTP status for a caller at the edge mapping this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::InvalidInput { .. } => 400,
            Error::InvalidTransition { .. } => 409,
            Error::Conflict(_) => 409,
            Error::Expired(_) => 410,
            Error::SystemPaused => 503,
            Error::UpstreamTimeout(_) => 504,
            Error::UpstreamError { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// True for the idempotence rule in §7: a `Conflict` caused only by an
    /// external callback re-delivering an already-applied event_id should be
    /// treated as success by the caller, not as a fresh failure.
    pub fn is_duplicate_event(&self) -> bool {
        matches!(self, Error::Conflict(msg) if msg.contains("already applied"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::not_found("order").code(), "NOT_FOUND");
        assert_eq!(Error::SystemPaused.code(), "SYSTEM_PAUSED");
        assert_eq!(
            Error::invalid_transition("paid", "shipped").code(),
            "INVALID_TRANSITION"
        );
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(Error::forbidden("x").http_status(), 403);
        assert_eq!(Error::SystemPaused.http_status(), 503);
        assert_eq!(Error::conflict("dup").http_status(), 409);
    }

    #[test]
    fn duplicate_event_detection() {
        let e = Error::conflict("event already applied: evt_1");
        assert!(e.is_duplicate_event());
        let e2 = Error::conflict("duplicate quote");
        assert!(!e2.is_duplicate_event());
    }
}

//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// state, quantity bounds, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not accepted from the aggregate's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The operation is structurally not allowed (e.g. dependent records exist).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A quantity would break a ledger bound.
    #[error("quantity exceeded: {context} (requested: {requested}, available: {available})")]
    QuantityExceeded {
        context: String,
        requested: Decimal,
        available: Decimal,
    },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// The target already exists (e.g. a second create on one stream). Not retryable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal state disagrees with itself. Never a business condition.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn quantity_exceeded(
        context: impl Into<String>,
        requested: Decimal,
        available: Decimal,
    ) -> Self {
        Self::QuantityExceeded {
            context: context.into(),
            requested,
            available,
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Defensive-check failures signal a bug, not a rejected command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_exceeded_message_carries_offending_quantities() {
        let err = DomainError::quantity_exceeded(
            "allocation exceeds remaining requirement",
            Decimal::from(4),
            Decimal::from(3),
        );
        let msg = err.to_string();
        assert!(msg.contains("requested: 4"));
        assert!(msg.contains("available: 3"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn only_invariant_violations_are_fatal() {
        assert!(DomainError::invariant("allocated total drifted").is_fatal());
        assert!(!DomainError::invalid_state("cancelled").is_fatal());
        assert!(!DomainError::conflict("stale").is_fatal());
    }
}

//! Domain error model.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failures raised by entities and movement records.
///
/// Storage and orchestration failures live in the infra crate; everything here
/// is deterministic given the entity state and the input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input: non-positive amount, blank batch code, bad dates.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A subtraction asked for more than the entity holds. State is unchanged.
    #[error("insufficient quantity: requested {requested}, available {available}")]
    InsufficientQuantity { requested: i64, available: i64 },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity is absent; carries what was looked up.
    #[error("{0} not found")]
    NotFound(String),

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

    pub fn insufficient(requested: i64, available: i64) -> Self {
        Self::InsufficientQuantity {
            requested,
            available,
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_quantity_reports_both_sides() {
        let err = DomainError::insufficient(15, 10);
        assert_eq!(
            err.to_string(),
            "insufficient quantity: requested 15, available 10"
        );
    }

    #[test]
    fn not_found_names_the_missing_entity() {
        assert_eq!(
            DomainError::not_found("batch LOT-7").to_string(),
            "batch LOT-7 not found"
        );
    }
}

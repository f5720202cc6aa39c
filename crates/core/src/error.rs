//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures raised by
/// entity methods (validation, invariants, conflicts).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A requested entity does not exist.
    #[error("{0} does not exist")]
    NotFound(String),

    /// A conflicting change (e.g. adding something that already exists).
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

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Rendering an entity's fields failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SerializationError {
    /// The serializer in use has no rule for this value type.
    #[error("object of type {type_name} is not serializable")]
    UnsupportedValue { type_name: &'static str },

    /// NaN and infinities have no JSON representation.
    #[error("non-finite float {0} is not serializable")]
    NonFiniteFloat(f64),
}

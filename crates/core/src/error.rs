//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure of a core operation maps to exactly one of these kinds. All of
/// them are per-request and recoverable by retrying or correcting the input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An entity reference did not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// A quantity was non-positive or otherwise malformed.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// The operation would drive a batch quantity negative.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Transfer target warehouse equals the source warehouse.
    #[error("cannot transfer a batch to the warehouse it is already in")]
    SameWarehouse,

    /// A state-machine rule was violated.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The acting user lacks the required capability.
    #[error("forbidden: missing capability '{0}'")]
    Forbidden(String),

    /// A route point was marked completed without an arrival time.
    #[error("route point #{0} cannot be completed without an arrival time")]
    MissingArrival(u32),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A conflict occurred (duplicate key, stale version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Stable machine-readable code, suitable for mapping to user-facing messages.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound(_) => "not_found",
            DomainError::InvalidQuantity(_) => "invalid_quantity",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::SameWarehouse => "same_warehouse",
            DomainError::InvalidTransition(_) => "invalid_transition",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::MissingArrival(_) => "missing_arrival",
            DomainError::Validation(_) => "validation_error",
            DomainError::Conflict(_) => "conflict",
            DomainError::InvalidId(_) => "invalid_id",
        }
    }
}

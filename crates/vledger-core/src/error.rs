//! # Error Types: Structured Error Hierarchy
//!
//! Errors for the primitives defined in this crate. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! - Identifier and amount constructors fail with [`ValidationError`],
//!   naming the offending input.
//! - Journal integrity and timestamp parsing fail with [`VledgerError`].

use thiserror::Error;

/// Top-level error type for core primitives.
#[derive(Error, Debug)]
pub enum VledgerError {
    /// Input failed a validation rule.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Hash chain or sequence continuity violated.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Timestamp could not be parsed.
    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation failure for a domain primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Vendor identifier is empty, too long, or uses disallowed characters.
    #[error("invalid vendor id {0:?}: expected 1-64 chars of [A-Za-z0-9_-]")]
    InvalidVendorId(String),

    /// Amount must be strictly positive in this context.
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    /// Amount must not be negative in this context.
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(i64),

    /// Arithmetic on amounts overflowed `i64`.
    #[error("amount overflow")]
    Overflow,

    /// A required free-text field was blank.
    #[error("{0} must not be empty")]
    Blank(&'static str),

    /// A free-text field exceeded its maximum length.
    #[error("{field} must not exceed {max} characters")]
    TooLong {
        /// The field name.
        field: &'static str,
        /// Maximum permitted length.
        max: usize,
    },
}

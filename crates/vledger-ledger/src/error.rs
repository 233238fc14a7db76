//! # Ledger Errors
//!
//! The single error type surfaced by every engine operation. Each variant
//! maps to a stable machine-readable code returned by [`LedgerError::code`];
//! the HTTP layer maps codes to status codes.

use thiserror::Error;

use vledger_core::{Amount, ValidationError, VendorId};
use vledger_state::{RequestError, RequestKind, RequestStatus, VendorError};

use crate::journal::JournalError;

/// Errors produced by the ledger engine.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// An entry failed amount, sign, or reference rules.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// A request or command failed input validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The vendor is blocked.
    #[error("vendor {0} is blocked")]
    VendorBlocked(VendorId),

    /// The vendor does not have enough available balance.
    #[error("vendor {vendor_id} has insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        vendor_id: VendorId,
        requested: Amount,
        available: Amount,
    },

    /// A cash collection would push exposure past the vendor's cash limit.
    #[error("vendor {vendor_id} cash exposure {exposure} would exceed limit {limit}")]
    CashLimitExceeded {
        vendor_id: VendorId,
        exposure: Amount,
        limit: Amount,
    },

    /// The request was already approved or rejected.
    #[error("{kind} {id} already decided: {status}")]
    AlreadyDecided {
        kind: RequestKind,
        id: u64,
        status: RequestStatus,
    },

    /// The operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The named resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The durable journal could not record the change. Nothing was
    /// committed in memory.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
}

impl LedgerError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEntry(_) => "INVALID_ENTRY",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::VendorBlocked(_) => "VENDOR_BLOCKED",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::CashLimitExceeded { .. } => "CASH_LIMIT_EXCEEDED",
            Self::AlreadyDecided { .. } => "ALREADY_DECIDED",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Journal(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn vendor_not_found(vendor_id: &VendorId) -> Self {
        Self::NotFound(format!("vendor {vendor_id}"))
    }
}

impl From<RequestError> for LedgerError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::AlreadyDecided { kind, id, status } => {
                Self::AlreadyDecided { kind, id, status }
            }
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<VendorError> for LedgerError {
    fn from(err: VendorError) -> Self {
        match err {
            VendorError::Blocked(vendor_id) => Self::VendorBlocked(vendor_id),
            VendorError::CashLimitExceeded {
                vendor_id,
                exposure,
                limit,
            } => Self::CashLimitExceeded {
                vendor_id,
                exposure,
                limit,
            },
            other @ VendorError::NegativeCashLimit(_) => Self::Validation(other.to_string()),
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

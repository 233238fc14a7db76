//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Domain errors from `vledger-ledger` keep their stable machine codes and
//! map to the HTTP status in the error table below. Journal failures are
//! logged and surface to clients only as `INTERNAL_ERROR`.
//!
//! | Error                 | HTTP | Code                  |
//! |-----------------------|------|-----------------------|
//! | `InvalidEntry`        | 422  | `INVALID_ENTRY`       |
//! | `Validation`          | 422  | `VALIDATION_ERROR`    |
//! | `VendorBlocked`       | 403  | `VENDOR_BLOCKED`      |
//! | `InsufficientBalance` | 409  | `INSUFFICIENT_BALANCE`|
//! | `CashLimitExceeded`   | 409  | `CASH_LIMIT_EXCEEDED` |
//! | `AlreadyDecided`      | 409  | `ALREADY_DECIDED`     |
//! | `Conflict`            | 409  | `CONFLICT`            |
//! | `NotFound`            | 404  | `NOT_FOUND`           |
//! | `Journal`             | 500  | `INTERNAL_ERROR`      |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use vledger_ledger::LedgerError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "INSUFFICIENT_BALANCE").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Structured context for domain errors, e.g. requested and available
    /// amounts. Never present on 500-class errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid bearer token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller role or vendor does not permit the operation (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// Domain error from the ledger engine.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Ledger(err) => (ledger_status(err), err.code()),
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Ledger(LedgerError::Journal(_)))
    }

    fn details(&self) -> Option<serde_json::Value> {
        let Self::Ledger(err) = self else {
            return None;
        };
        match err {
            LedgerError::VendorBlocked(vendor_id) => Some(json!({ "vendor_id": vendor_id })),
            LedgerError::InsufficientBalance {
                vendor_id,
                requested,
                available,
            } => Some(json!({
                "vendor_id": vendor_id,
                "requested": requested.minor_units(),
                "available": available.minor_units(),
            })),
            LedgerError::CashLimitExceeded {
                vendor_id,
                exposure,
                limit,
            } => Some(json!({
                "vendor_id": vendor_id,
                "exposure": exposure.minor_units(),
                "limit": limit.minor_units(),
            })),
            LedgerError::AlreadyDecided { kind, id, status } => Some(json!({
                "kind": kind.as_str(),
                "id": id,
                "status": status.as_str(),
            })),
            _ => None,
        }
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InvalidEntry(_) | LedgerError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LedgerError::VendorBlocked(_) => StatusCode::FORBIDDEN,
        LedgerError::InsufficientBalance { .. }
        | LedgerError::CashLimitExceeded { .. }
        | LedgerError::AlreadyDecided { .. }
        | LedgerError::Conflict(_) => StatusCode::CONFLICT,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Journal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let (message, details) = if self.is_internal() {
            tracing::error!(error = %self, "internal server error");
            ("An internal error occurred".to_string(), None)
        } else {
            (self.to_string(), self.details())
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<vledger_core::ValidationError> for AppError {
    fn from(err: vledger_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

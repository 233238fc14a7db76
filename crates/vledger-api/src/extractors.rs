//! # Custom Extractors & Validation
//!
//! The [`Validate`] trait for request DTOs, helpers that extract and
//! validate JSON bodies in handlers, and parsing for path and header
//! values that carry domain types.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;

use vledger_core::VendorId;
use vledger_ledger::MAX_IDEMPOTENCY_KEY_LEN;

use crate::error::AppError;

/// Header carrying the client's idempotency key on create endpoints.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Business rules beyond what serde deserialization checks.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Parse a body that may be absent. An empty body yields `T::default()`;
/// anything else must be valid JSON for `T`.
pub fn extract_optional_json<T>(body: &Bytes) -> Result<T, AppError>
where
    T: DeserializeOwned + Default + Validate,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let value: T = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Parse a vendor id taken from the path or a body.
pub fn parse_vendor_id(raw: &str) -> Result<VendorId, AppError> {
    Ok(VendorId::new(raw)?)
}

/// Read the optional `Idempotency-Key` header.
pub fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::BadRequest("Idempotency-Key must be visible ASCII".into()))?
        .trim();
    if key.is_empty() {
        return Ok(None);
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::Validation(format!(
            "Idempotency-Key must not exceed {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(Some(key.to_string()))
}

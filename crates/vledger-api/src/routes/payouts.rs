//! # Payout Request Handlers
//!
//! Settlements and withdrawals share one request lifecycle, so their
//! handlers share one implementation here. `settlements.rs` and
//! `withdrawals.rs` hold the annotated route functions that delegate to it.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use vledger_core::{Amount, SettlementId, WithdrawalId};
use vledger_ledger::{LedgerEngine, PayoutKind, RequestWorkflow};
use vledger_state::{PayoutRequest, RequestTransitionRecord, MAX_NOTE_LEN};

use crate::auth::{require_role, require_vendor_access, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{
    extract_optional_json, extract_validated_json, idempotency_key, parse_vendor_id, Validate,
};
use crate::state::AppState;

// ── DTOs ────────────────────────────────────────────────────────────

/// Open a settlement or withdrawal request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreatePayoutRequest {
    /// Required for admins. Vendors may omit it; when present it must be
    /// their own id.
    pub vendor_id: Option<String>,
    /// Positive minor units.
    pub amount: i64,
}

impl Validate for CreatePayoutRequest {
    fn validate(&self) -> Result<(), String> {
        if self.amount <= 0 {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        Ok(())
    }
}

/// Optional body of an approval.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ApproveRequest {
    pub admin_notes: Option<String>,
}

impl Validate for ApproveRequest {
    fn validate(&self) -> Result<(), String> {
        check_note_len("admin_notes", self.admin_notes.as_deref())
    }
}

/// Body of a rejection.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RejectRequest {
    pub rejection_reason: String,
}

impl Validate for RejectRequest {
    fn validate(&self) -> Result<(), String> {
        if self.rejection_reason.trim().is_empty() {
            return Err("rejection_reason must not be empty".into());
        }
        check_note_len("rejection_reason", Some(&self.rejection_reason))
    }
}

fn check_note_len(field: &str, text: Option<&str>) -> Result<(), String> {
    match text {
        Some(text) if text.chars().count() > MAX_NOTE_LEN => {
            Err(format!("{field} must not exceed {MAX_NOTE_LEN} characters"))
        }
        _ => Ok(()),
    }
}

/// A settlement or withdrawal request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PayoutRequestResponse {
    pub id: u64,
    /// `settlement` or `withdrawal`.
    pub kind: String,
    pub vendor_id: String,
    pub amount: i64,
    /// `pending`, `approved` or `rejected`.
    pub status: String,
    pub created_by: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    /// Ledger entry written on approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_entry_id: Option<u64>,
    pub transitions: Vec<TransitionResponse>,
}

impl<Id: PayoutKind> From<PayoutRequest<Id>> for PayoutRequestResponse {
    fn from(request: PayoutRequest<Id>) -> Self {
        Self {
            id: request.id.seq(),
            kind: Id::KIND.as_str().to_string(),
            vendor_id: request.vendor_id.to_string(),
            amount: request.amount.minor_units(),
            status: request.status.as_str().to_string(),
            created_by: request.created_by,
            created_at: request.created_at.to_rfc3339(),
            idempotency_key: request.idempotency_key,
            admin_notes: request.admin_notes,
            rejection_reason: request.rejection_reason,
            decided_at: request.decided_at.map(|at| at.to_rfc3339()),
            decided_by: request.decided_by,
            payout_entry_id: request.payout_entry_id.map(|id| id.value()),
            transitions: request.transitions.into_iter().map(Into::into).collect(),
        }
    }
}

/// One recorded state transition.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransitionResponse {
    pub from_state: String,
    pub to_state: String,
    pub timestamp: String,
    pub actor: String,
}

impl From<RequestTransitionRecord> for TransitionResponse {
    fn from(record: RequestTransitionRecord) -> Self {
        Self {
            from_state: record.from_state.as_str().to_string(),
            to_state: record.to_state.as_str().to_string(),
            timestamp: record.timestamp.to_rfc3339(),
            actor: record.actor,
        }
    }
}

/// A listing of requests.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PayoutListResponse {
    pub requests: Vec<PayoutRequestResponse>,
}

impl<Id: PayoutKind> FromIterator<PayoutRequest<Id>> for PayoutListResponse {
    fn from_iter<I: IntoIterator<Item = PayoutRequest<Id>>>(iter: I) -> Self {
        Self {
            requests: iter.into_iter().map(Into::into).collect(),
        }
    }
}

// ── Shared handlers ─────────────────────────────────────────────────

/// Picks the engine's workflow for a request id type.
pub(crate) trait Routed: PayoutKind {
    fn workflow(engine: &LedgerEngine) -> &RequestWorkflow<Self>;
}

impl Routed for SettlementId {
    fn workflow(engine: &LedgerEngine) -> &RequestWorkflow<Self> {
        engine.settlements()
    }
}

impl Routed for WithdrawalId {
    fn workflow(engine: &LedgerEngine) -> &RequestWorkflow<Self> {
        engine.withdrawals()
    }
}

/// Create a request. 201 when new, 200 when the idempotency key matched
/// an earlier request.
pub(crate) async fn create<Id: Routed>(
    state: &AppState,
    caller: &CallerIdentity,
    headers: &HeaderMap,
    body: Result<Json<CreatePayoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PayoutRequestResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let key = idempotency_key(headers)?;
    let vendor_id = match (req.vendor_id.as_deref(), &caller.vendor_id) {
        (Some(raw), _) => parse_vendor_id(raw)?,
        (None, Some(own)) => own.clone(),
        (None, None) => return Err(AppError::Validation("vendor_id is required".into())),
    };
    require_vendor_access(caller, &vendor_id)?;

    let actor = caller.actor();
    let amount = Amount::new(req.amount);
    let created = state
        .run(move |engine| Id::workflow(engine).create(&vendor_id, amount, &actor, key))
        .await?;

    let status = if created.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(created.request.into())))
}

/// Fetch one request; vendors only see their own.
pub(crate) fn fetch<Id: Routed>(
    state: &AppState,
    caller: &CallerIdentity,
    id: u64,
) -> Result<Json<PayoutRequestResponse>, AppError> {
    let request = Id::workflow(&state.engine).get(Id::from_seq(id))?;
    require_vendor_access(caller, &request.vendor_id)?;
    Ok(Json(request.into()))
}

pub(crate) async fn approve<Id: Routed>(
    state: &AppState,
    caller: &CallerIdentity,
    id: u64,
    body: &Bytes,
) -> Result<Json<PayoutRequestResponse>, AppError> {
    require_role(caller, Role::Admin)?;
    let req: ApproveRequest = extract_optional_json(body)?;
    let actor = caller.actor();
    let request = state
        .run(move |engine| {
            Id::workflow(engine).approve(Id::from_seq(id), &actor, req.admin_notes)
        })
        .await?;
    Ok(Json(request.into()))
}

pub(crate) async fn reject<Id: Routed>(
    state: &AppState,
    caller: &CallerIdentity,
    id: u64,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<PayoutRequestResponse>, AppError> {
    require_role(caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let actor = caller.actor();
    let request = state
        .run(move |engine| {
            Id::workflow(engine).reject(Id::from_seq(id), &actor, &req.rejection_reason)
        })
        .await?;
    Ok(Json(request.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vledger_core::{Timestamp, VendorId};

    #[test]
    fn reject_requires_reason() {
        let blank = RejectRequest {
            rejection_reason: "   ".into(),
        };
        assert!(blank.validate().is_err());
        let long = RejectRequest {
            rejection_reason: "x".repeat(MAX_NOTE_LEN + 1),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn create_rejects_non_positive_amount() {
        let req = CreatePayoutRequest {
            vendor_id: None,
            amount: 0,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn response_carries_kind_and_status() {
        let request = PayoutRequest::open(
            WithdrawalId(7),
            VendorId::new("v-1").unwrap(),
            Amount::new(250),
            "vendor:v-1",
            Some("wd-1".into()),
            Timestamp::now(),
        )
        .unwrap();
        let resp = PayoutRequestResponse::from(request);
        assert_eq!(resp.id, 7);
        assert_eq!(resp.kind, "withdrawal");
        assert_eq!(resp.status, "pending");
        assert_eq!(resp.idempotency_key.as_deref(), Some("wd-1"));
        assert!(resp.payout_entry_id.is_none());
    }
}

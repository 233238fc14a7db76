//! # Vendor API
//!
//! Vendor registration, balance summaries, the paginated ledger view,
//! admin ledger postings, cash collections, and the status gate (block,
//! unblock, cash limit).
//!
//! Vendors may read their own summary and ledger and record their own cash
//! collections. Everything else is admin-only.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use vledger_core::{Amount, EntryId, VendorId};
use vledger_ledger::{LedgerEntry, NewEntry, VendorSummary, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use vledger_state::{StatusChange, VendorAccount};

use crate::auth::{require_role, require_vendor_access, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, parse_vendor_id, Validate};
use crate::state::AppState;

// ── DTOs ────────────────────────────────────────────────────────────

/// Register a vendor.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RegisterVendorRequest {
    /// 1-64 characters of `[A-Za-z0-9_-]`.
    pub vendor_id: String,
    /// Cash limit in minor units. Defaults to the service-wide limit.
    pub cash_limit: Option<i64>,
}

impl Validate for RegisterVendorRequest {
    fn validate(&self) -> Result<(), String> {
        VendorId::new(self.vendor_id.as_str()).map_err(|e| e.to_string())?;
        match self.cash_limit {
            Some(limit) if limit < 0 => Err(format!("cash_limit must not be negative, got {limit}")),
            _ => Ok(()),
        }
    }
}

/// Append a charge or adjustment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PostEntryRequest {
    pub kind: PostableKind,
    /// Signed minor units. Charges must be positive, adjustments non-zero.
    pub amount: i64,
    pub booking_id: Option<String>,
    pub memo: Option<String>,
}

/// Entry kinds an admin may post directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PostableKind {
    Charge,
    Adjustment,
}

impl Validate for PostEntryRequest {
    fn validate(&self) -> Result<(), String> {
        if self.amount == 0 {
            return Err("amount must not be zero".into());
        }
        Ok(())
    }
}

/// Cash the vendor collected directly from a customer.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CashCollectionRequest {
    /// Positive minor units collected.
    pub amount: i64,
    pub booking_id: Option<String>,
}

impl Validate for CashCollectionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.amount <= 0 {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        Ok(())
    }
}

/// Replace the vendor's cash limit.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CashLimitRequest {
    pub cash_limit: i64,
}

impl Validate for CashLimitRequest {
    fn validate(&self) -> Result<(), String> {
        if self.cash_limit < 0 {
            return Err(format!(
                "cash_limit must not be negative, got {}",
                self.cash_limit
            ));
        }
        Ok(())
    }
}

/// Ledger pagination. `since` is the id of the last entry already seen.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LedgerQuery {
    pub since: Option<u64>,
    /// Page size, default 100, capped at 1000.
    pub limit: Option<usize>,
}

/// Status and balance figures for one vendor.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VendorResponse {
    pub vendor_id: String,
    pub blocked: bool,
    pub cash_limit: i64,
    pub balance: i64,
    pub pending_reserved: i64,
    pub available: i64,
    pub cash_exposure: i64,
    pub entry_count: usize,
    pub registered_at: String,
    pub updated_at: String,
    pub history: Vec<StatusChangeResponse>,
}

impl VendorResponse {
    fn new(account: VendorAccount, summary: VendorSummary) -> Self {
        Self {
            vendor_id: account.vendor_id.to_string(),
            blocked: account.blocked,
            cash_limit: account.cash_limit.minor_units(),
            balance: summary.balance.minor_units(),
            pending_reserved: summary.pending_reserved.minor_units(),
            available: summary.available.minor_units(),
            cash_exposure: summary.cash_exposure.minor_units(),
            entry_count: summary.entry_count,
            registered_at: account.registered_at.to_rfc3339(),
            updated_at: account.updated_at.to_rfc3339(),
            history: account.history.into_iter().map(Into::into).collect(),
        }
    }
}

/// One admin status change.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusChangeResponse {
    /// `blocked`, `unblocked` or `cash_limit`.
    pub change: String,
    pub actor: String,
    pub at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl From<StatusChange> for StatusChangeResponse {
    fn from(change: StatusChange) -> Self {
        let (name, at, actor, previous_limit, limit) = match change {
            StatusChange::Blocked { at, actor } => ("blocked", at, actor, None, None),
            StatusChange::Unblocked { at, actor } => ("unblocked", at, actor, None, None),
            StatusChange::CashLimit {
                at,
                actor,
                previous,
                limit,
            } => (
                "cash_limit",
                at,
                actor,
                Some(previous.minor_units()),
                Some(limit.minor_units()),
            ),
        };
        Self {
            change: name.to_string(),
            actor,
            at: at.to_rfc3339(),
            previous_limit,
            limit,
        }
    }
}

/// All vendors, served from the summary cache.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VendorListResponse {
    pub vendors: Vec<VendorResponse>,
}

/// An immutable ledger entry.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntryResponse {
    pub id: u64,
    pub vendor_id: String,
    pub amount: i64,
    /// `charge`, `payout`, `adjustment` or `cash_collection`.
    pub kind: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_settlement_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_withdrawal_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_booking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id.value(),
            vendor_id: entry.vendor_id.to_string(),
            amount: entry.amount.minor_units(),
            kind: entry.kind.as_str().to_string(),
            created_at: entry.created_at.to_rfc3339(),
            related_settlement_id: entry.related_settlement_id.map(|id| id.value()),
            related_withdrawal_id: entry.related_withdrawal_id.map(|id| id.value()),
            related_booking_id: entry.related_booking_id,
            memo: entry.memo,
        }
    }
}

/// A page of ledger entries in creation order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LedgerPage {
    pub vendor_id: String,
    pub entries: Vec<LedgerEntryResponse>,
    /// Pass as `since` to fetch the next page. Absent on the last page.
    pub next_cursor: Option<u64>,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/vendors", get(list_vendors).post(register_vendor))
        .route("/v1/vendors/:vendor_id", get(get_vendor))
        .route(
            "/v1/vendors/:vendor_id/ledger",
            get(get_ledger).post(post_entry),
        )
        .route(
            "/v1/vendors/:vendor_id/cash-collections",
            post(record_cash_collection),
        )
        .route("/v1/vendors/:vendor_id/block", post(block_vendor))
        .route("/v1/vendors/:vendor_id/unblock", post(unblock_vendor))
        .route("/v1/vendors/:vendor_id/cash-limit", post(set_cash_limit))
}

// ── Handlers ────────────────────────────────────────────────────────

/// Live account and summary for one vendor.
fn vendor_view(state: &AppState, vendor_id: &VendorId) -> Result<VendorResponse, AppError> {
    let account = state.engine.gate().account(vendor_id)?;
    let summary = state.engine.projector().summary(vendor_id)?;
    Ok(VendorResponse::new(account, summary))
}

#[utoipa::path(
    get,
    path = "/v1/vendors",
    responses(
        (status = 200, description = "All vendors with cached balances", body = VendorListResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "vendors"
)]
async fn list_vendors(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<VendorListResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let vendors = state
        .engine
        .vendor_summaries()?
        .into_iter()
        .map(|(account, summary)| VendorResponse::new(account, summary))
        .collect();
    Ok(Json(VendorListResponse { vendors }))
}

#[utoipa::path(
    post,
    path = "/v1/vendors",
    request_body = RegisterVendorRequest,
    responses(
        (status = 201, description = "Vendor registered", body = VendorResponse),
        (status = 409, description = "Vendor already registered", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "vendors"
)]
async fn register_vendor(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RegisterVendorRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VendorResponse>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let vendor_id = parse_vendor_id(&req.vendor_id)?;
    let cash_limit = req.cash_limit.map(Amount::new);

    let registered = vendor_id.clone();
    state
        .run(move |engine| engine.register_vendor(registered, cash_limit))
        .await?;
    Ok((StatusCode::CREATED, Json(vendor_view(&state, &vendor_id)?)))
}

#[utoipa::path(
    get,
    path = "/v1/vendors/{vendor_id}",
    params(("vendor_id" = String, Path, description = "Vendor ID")),
    responses(
        (status = 200, description = "Vendor status and live balances", body = VendorResponse),
        (status = 403, description = "Not this vendor", body = crate::error::ErrorBody),
        (status = 404, description = "Vendor not found", body = crate::error::ErrorBody),
    ),
    tag = "vendors"
)]
async fn get_vendor(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(vendor_id): Path<String>,
) -> Result<Json<VendorResponse>, AppError> {
    let vendor_id = parse_vendor_id(&vendor_id)?;
    require_vendor_access(&caller, &vendor_id)?;
    Ok(Json(vendor_view(&state, &vendor_id)?))
}

#[utoipa::path(
    get,
    path = "/v1/vendors/{vendor_id}/ledger",
    params(("vendor_id" = String, Path, description = "Vendor ID"), LedgerQuery),
    responses(
        (status = 200, description = "Entries after `since` in creation order", body = LedgerPage),
        (status = 403, description = "Not this vendor", body = crate::error::ErrorBody),
        (status = 404, description = "Vendor not found", body = crate::error::ErrorBody),
    ),
    tag = "vendors"
)]
async fn get_ledger(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(vendor_id): Path<String>,
    query: Result<Query<LedgerQuery>, QueryRejection>,
) -> Result<Json<LedgerPage>, AppError> {
    let vendor_id = parse_vendor_id(&vendor_id)?;
    require_vendor_access(&caller, &vendor_id)?;
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);
    if limit == 0 {
        return Err(AppError::Validation("limit must be at least 1".into()));
    }
    let engine = &state.engine;
    let entries = engine.entries_for(&vendor_id, query.since.map(EntryId), limit)?;

    let next_cursor = match entries.last() {
        Some(last) if entries.len() == limit => {
            let more = !engine.entries_for(&vendor_id, Some(last.id), 1)?.is_empty();
            more.then(|| last.id.value())
        }
        _ => None,
    };

    Ok(Json(LedgerPage {
        vendor_id: vendor_id.to_string(),
        entries: entries.into_iter().map(Into::into).collect(),
        next_cursor,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/vendors/{vendor_id}/ledger",
    params(("vendor_id" = String, Path, description = "Vendor ID")),
    request_body = PostEntryRequest,
    responses(
        (status = 201, description = "Entry appended", body = LedgerEntryResponse),
        (status = 404, description = "Vendor not found", body = crate::error::ErrorBody),
        (status = 422, description = "Entry violates sign or reference rules", body = crate::error::ErrorBody),
    ),
    tag = "vendors"
)]
async fn post_entry(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(vendor_id): Path<String>,
    body: Result<Json<PostEntryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LedgerEntryResponse>), AppError> {
    require_role(&caller, Role::Admin)?;
    let vendor_id = parse_vendor_id(&vendor_id)?;
    let req = extract_validated_json(body)?;

    let amount = Amount::new(req.amount);
    let mut draft = match req.kind {
        PostableKind::Charge => NewEntry::charge(vendor_id, amount, req.booking_id),
        PostableKind::Adjustment => {
            let mut draft = NewEntry::adjustment(vendor_id, amount, None);
            draft.related_booking_id = req.booking_id;
            draft
        }
    };
    draft.memo = req.memo;

    let entry = state.run(move |engine| engine.post_entry(draft)).await?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

#[utoipa::path(
    post,
    path = "/v1/vendors/{vendor_id}/cash-collections",
    params(("vendor_id" = String, Path, description = "Vendor ID")),
    request_body = CashCollectionRequest,
    responses(
        (status = 201, description = "Cash collection recorded", body = LedgerEntryResponse),
        (status = 403, description = "Vendor blocked or not this vendor", body = crate::error::ErrorBody),
        (status = 409, description = "Cash limit exceeded", body = crate::error::ErrorBody),
    ),
    tag = "vendors"
)]
async fn record_cash_collection(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(vendor_id): Path<String>,
    body: Result<Json<CashCollectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LedgerEntryResponse>), AppError> {
    let vendor_id = parse_vendor_id(&vendor_id)?;
    require_vendor_access(&caller, &vendor_id)?;
    let req = extract_validated_json(body)?;

    let amount = Amount::new(req.amount);
    let entry = state
        .run(move |engine| {
            engine
                .gate()
                .record_cash_collection(&vendor_id, amount, req.booking_id)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

#[utoipa::path(
    post,
    path = "/v1/vendors/{vendor_id}/block",
    params(("vendor_id" = String, Path, description = "Vendor ID")),
    responses(
        (status = 200, description = "Vendor blocked (idempotent)", body = VendorResponse),
        (status = 404, description = "Vendor not found", body = crate::error::ErrorBody),
    ),
    tag = "vendors"
)]
async fn block_vendor(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(vendor_id): Path<String>,
) -> Result<Json<VendorResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let vendor_id = parse_vendor_id(&vendor_id)?;
    let actor = caller.actor();
    let target = vendor_id.clone();
    state
        .run(move |engine| engine.gate().block(&target, &actor))
        .await?;
    Ok(Json(vendor_view(&state, &vendor_id)?))
}

#[utoipa::path(
    post,
    path = "/v1/vendors/{vendor_id}/unblock",
    params(("vendor_id" = String, Path, description = "Vendor ID")),
    responses(
        (status = 200, description = "Vendor unblocked (idempotent)", body = VendorResponse),
        (status = 404, description = "Vendor not found", body = crate::error::ErrorBody),
    ),
    tag = "vendors"
)]
async fn unblock_vendor(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(vendor_id): Path<String>,
) -> Result<Json<VendorResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let vendor_id = parse_vendor_id(&vendor_id)?;
    let actor = caller.actor();
    let target = vendor_id.clone();
    state
        .run(move |engine| engine.gate().unblock(&target, &actor))
        .await?;
    Ok(Json(vendor_view(&state, &vendor_id)?))
}

#[utoipa::path(
    post,
    path = "/v1/vendors/{vendor_id}/cash-limit",
    params(("vendor_id" = String, Path, description = "Vendor ID")),
    request_body = CashLimitRequest,
    responses(
        (status = 200, description = "Cash limit updated", body = VendorResponse),
        (status = 404, description = "Vendor not found", body = crate::error::ErrorBody),
        (status = 422, description = "Negative limit", body = crate::error::ErrorBody),
    ),
    tag = "vendors"
)]
async fn set_cash_limit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(vendor_id): Path<String>,
    body: Result<Json<CashLimitRequest>, JsonRejection>,
) -> Result<Json<VendorResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let vendor_id = parse_vendor_id(&vendor_id)?;
    let req = extract_validated_json(body)?;
    let actor = caller.actor();
    let target = vendor_id.clone();
    state
        .run(move |engine| {
            engine
                .gate()
                .set_cash_limit(&target, Amount::new(req.cash_limit), &actor)
        })
        .await?;
    Ok(Json(vendor_view(&state, &vendor_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_validation() {
        let ok = RegisterVendorRequest {
            vendor_id: "plumber-1".into(),
            cash_limit: Some(0),
        };
        assert!(ok.validate().is_ok());

        let bad_id = RegisterVendorRequest {
            vendor_id: "has space".into(),
            cash_limit: None,
        };
        assert!(bad_id.validate().is_err());

        let negative = RegisterVendorRequest {
            vendor_id: "v".into(),
            cash_limit: Some(-5),
        };
        assert!(negative.validate().unwrap_err().contains("negative"));
    }

    #[test]
    fn post_entry_rejects_float_amounts() {
        let err = serde_json::from_str::<PostEntryRequest>(r#"{"kind":"charge","amount":10.5}"#);
        assert!(err.is_err());
        let ok: PostEntryRequest =
            serde_json::from_str(r#"{"kind":"adjustment","amount":-10}"#).unwrap();
        assert_eq!(ok.kind, PostableKind::Adjustment);
    }

    #[test]
    fn payout_kind_cannot_be_posted() {
        assert!(serde_json::from_str::<PostEntryRequest>(r#"{"kind":"payout","amount":-10}"#).is_err());
    }

    #[test]
    fn cash_collection_requires_positive_amount() {
        let req = CashCollectionRequest {
            amount: 0,
            booking_id: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn status_change_response_shapes() {
        let at = vledger_core::Timestamp::now();
        let resp = StatusChangeResponse::from(StatusChange::CashLimit {
            at,
            actor: "admin".into(),
            previous: Amount::new(10),
            limit: Amount::new(20),
        });
        assert_eq!(resp.change, "cash_limit");
        assert_eq!(resp.previous_limit, Some(10));
        assert_eq!(resp.limit, Some(20));
    }
}

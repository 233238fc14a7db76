//! # Settlement API
//!
//! Settlement requests move accumulated vendor balance into a payout once
//! an admin approves them. Creating one reserves the amount against the
//! vendor's available balance; approval writes the negative payout entry;
//! rejection has no ledger effect.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};

use vledger_core::SettlementId;

use super::payouts::{
    self, ApproveRequest, CreatePayoutRequest, PayoutListResponse, PayoutRequestResponse,
    RejectRequest,
};
use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/settlements", post(create_settlement))
        .route("/v1/settlements/pending", get(pending_settlements))
        .route("/v1/settlements/history", get(settlement_history))
        .route("/v1/settlements/:settlement_id", get(get_settlement))
        .route(
            "/v1/settlements/:settlement_id/approve",
            post(approve_settlement),
        )
        .route(
            "/v1/settlements/:settlement_id/reject",
            post(reject_settlement),
        )
}

#[utoipa::path(
    post,
    path = "/v1/settlements",
    request_body = CreatePayoutRequest,
    params(("Idempotency-Key" = Option<String>, Header, description = "Replays the original request when reused")),
    responses(
        (status = 201, description = "Settlement request created", body = PayoutRequestResponse),
        (status = 200, description = "Idempotent replay of an earlier request", body = PayoutRequestResponse),
        (status = 403, description = "Vendor blocked or not this vendor", body = crate::error::ErrorBody),
        (status = 409, description = "Insufficient available balance or key reused", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "settlements"
)]
async fn create_settlement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    headers: HeaderMap,
    body: Result<Json<CreatePayoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PayoutRequestResponse>), AppError> {
    payouts::create::<SettlementId>(&state, &caller, &headers, body).await
}

#[utoipa::path(
    get,
    path = "/v1/settlements/pending",
    responses(
        (status = 200, description = "Pending settlements, oldest first", body = PayoutListResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "settlements"
)]
async fn pending_settlements(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<PayoutListResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(state.engine.settlements().pending().into_iter().collect()))
}

#[utoipa::path(
    get,
    path = "/v1/settlements/history",
    responses(
        (status = 200, description = "Decided settlements, most recent first", body = PayoutListResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "settlements"
)]
async fn settlement_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<PayoutListResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(state.engine.settlements().history().into_iter().collect()))
}

#[utoipa::path(
    get,
    path = "/v1/settlements/{settlement_id}",
    params(("settlement_id" = u64, Path, description = "Settlement ID")),
    responses(
        (status = 200, description = "Settlement request", body = PayoutRequestResponse),
        (status = 403, description = "Not this vendor", body = crate::error::ErrorBody),
        (status = 404, description = "Settlement not found", body = crate::error::ErrorBody),
    ),
    tag = "settlements"
)]
async fn get_settlement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(settlement_id): Path<u64>,
) -> Result<Json<PayoutRequestResponse>, AppError> {
    payouts::fetch::<SettlementId>(&state, &caller, settlement_id)
}

#[utoipa::path(
    post,
    path = "/v1/settlements/{settlement_id}/approve",
    params(("settlement_id" = u64, Path, description = "Settlement ID")),
    request_body(content = ApproveRequest, description = "Optional admin notes; the body may be empty"),
    responses(
        (status = 200, description = "Approved; payout entry written", body = PayoutRequestResponse),
        (status = 404, description = "Settlement not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already decided or balance no longer covers it", body = crate::error::ErrorBody),
    ),
    tag = "settlements"
)]
async fn approve_settlement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(settlement_id): Path<u64>,
    body: Bytes,
) -> Result<Json<PayoutRequestResponse>, AppError> {
    payouts::approve::<SettlementId>(&state, &caller, settlement_id, &body).await
}

#[utoipa::path(
    post,
    path = "/v1/settlements/{settlement_id}/reject",
    params(("settlement_id" = u64, Path, description = "Settlement ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected; no ledger effect", body = PayoutRequestResponse),
        (status = 404, description = "Settlement not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already decided", body = crate::error::ErrorBody),
        (status = 422, description = "Empty rejection reason", body = crate::error::ErrorBody),
    ),
    tag = "settlements"
)]
async fn reject_settlement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(settlement_id): Path<u64>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<PayoutRequestResponse>, AppError> {
    payouts::reject::<SettlementId>(&state, &caller, settlement_id, body).await
}

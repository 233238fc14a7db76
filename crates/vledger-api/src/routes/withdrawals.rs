//! # Withdrawal API
//!
//! Vendor-initiated draws on available balance. Withdrawals follow the
//! same lifecycle as settlements with their own id sequence and a minimum
//! amount (`VLEDGER_WITHDRAWAL_MIN_AMOUNT`).

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use vledger_core::WithdrawalId;
use vledger_state::RequestStatus;

use super::payouts::{
    self, ApproveRequest, CreatePayoutRequest, PayoutListResponse, PayoutRequestResponse,
    RejectRequest,
};
use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::state::AppState;

/// Optional status filter for the withdrawal listing.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WithdrawalQuery {
    /// `pending`, `approved` or `rejected`.
    pub status: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/withdrawals",
            get(list_withdrawals).post(create_withdrawal),
        )
        .route("/v1/withdrawals/:withdrawal_id", get(get_withdrawal))
        .route(
            "/v1/withdrawals/:withdrawal_id/approve",
            post(approve_withdrawal),
        )
        .route(
            "/v1/withdrawals/:withdrawal_id/reject",
            post(reject_withdrawal),
        )
}

#[utoipa::path(
    get,
    path = "/v1/withdrawals",
    params(WithdrawalQuery),
    responses(
        (status = 200, description = "Withdrawals in id order", body = PayoutListResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
async fn list_withdrawals(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<WithdrawalQuery>, QueryRejection>,
) -> Result<Json<PayoutListResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RequestStatus>)
        .transpose()
        .map_err(AppError::Validation)?;
    Ok(Json(
        state
            .engine
            .withdrawals()
            .book()
            .list(status)
            .into_iter()
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/withdrawals",
    request_body = CreatePayoutRequest,
    params(("Idempotency-Key" = Option<String>, Header, description = "Replays the original request when reused")),
    responses(
        (status = 201, description = "Withdrawal request created", body = PayoutRequestResponse),
        (status = 200, description = "Idempotent replay of an earlier request", body = PayoutRequestResponse),
        (status = 403, description = "Vendor blocked or not this vendor", body = crate::error::ErrorBody),
        (status = 409, description = "Insufficient available balance or key reused", body = crate::error::ErrorBody),
        (status = 422, description = "Below the minimum amount", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
async fn create_withdrawal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    headers: HeaderMap,
    body: Result<Json<CreatePayoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PayoutRequestResponse>), AppError> {
    payouts::create::<WithdrawalId>(&state, &caller, &headers, body).await
}

#[utoipa::path(
    get,
    path = "/v1/withdrawals/{withdrawal_id}",
    params(("withdrawal_id" = u64, Path, description = "Withdrawal ID")),
    responses(
        (status = 200, description = "Withdrawal request", body = PayoutRequestResponse),
        (status = 403, description = "Not this vendor", body = crate::error::ErrorBody),
        (status = 404, description = "Withdrawal not found", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
async fn get_withdrawal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(withdrawal_id): Path<u64>,
) -> Result<Json<PayoutRequestResponse>, AppError> {
    payouts::fetch::<WithdrawalId>(&state, &caller, withdrawal_id)
}

#[utoipa::path(
    post,
    path = "/v1/withdrawals/{withdrawal_id}/approve",
    params(("withdrawal_id" = u64, Path, description = "Withdrawal ID")),
    request_body(content = ApproveRequest, description = "Optional admin notes; the body may be empty"),
    responses(
        (status = 200, description = "Approved; payout entry written", body = PayoutRequestResponse),
        (status = 404, description = "Withdrawal not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already decided or balance no longer covers it", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
async fn approve_withdrawal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(withdrawal_id): Path<u64>,
    body: Bytes,
) -> Result<Json<PayoutRequestResponse>, AppError> {
    payouts::approve::<WithdrawalId>(&state, &caller, withdrawal_id, &body).await
}

#[utoipa::path(
    post,
    path = "/v1/withdrawals/{withdrawal_id}/reject",
    params(("withdrawal_id" = u64, Path, description = "Withdrawal ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected; no ledger effect", body = PayoutRequestResponse),
        (status = 404, description = "Withdrawal not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already decided", body = crate::error::ErrorBody),
        (status = 422, description = "Empty rejection reason", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
async fn reject_withdrawal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(withdrawal_id): Path<u64>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<PayoutRequestResponse>, AppError> {
    payouts::reject::<WithdrawalId>(&state, &caller, withdrawal_id, body).await
}

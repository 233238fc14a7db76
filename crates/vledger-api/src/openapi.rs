//! # OpenAPI Document Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI document
//! served at `/openapi.json` to admin callers.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::state::AppState;

/// Adds the bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "`vendor:{vendor_id}:{secret}`, `admin:{name}:{secret}` or `{secret}`. The secret is AUTH_TOKEN.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vendor Ledger API",
        version = "0.1.0",
        description = "Vendor balances, settlement and withdrawal workflows for a home-services marketplace.\n\nAll amounts are integer minor units. Ledger entries are immutable; balances are always the sum of a vendor's entries.\n\nAuthentication: Bearer token via `Authorization: Bearer <token>`. Health probes (`/health/*`) and `/metrics` are unauthenticated.",
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Vendors ──────────────────────────────────────────────────────
        crate::routes::vendors::list_vendors,
        crate::routes::vendors::register_vendor,
        crate::routes::vendors::get_vendor,
        crate::routes::vendors::get_ledger,
        crate::routes::vendors::post_entry,
        crate::routes::vendors::record_cash_collection,
        crate::routes::vendors::block_vendor,
        crate::routes::vendors::unblock_vendor,
        crate::routes::vendors::set_cash_limit,
        // ── Settlements ──────────────────────────────────────────────────
        crate::routes::settlements::create_settlement,
        crate::routes::settlements::pending_settlements,
        crate::routes::settlements::settlement_history,
        crate::routes::settlements::get_settlement,
        crate::routes::settlements::approve_settlement,
        crate::routes::settlements::reject_settlement,
        // ── Withdrawals ──────────────────────────────────────────────────
        crate::routes::withdrawals::list_withdrawals,
        crate::routes::withdrawals::create_withdrawal,
        crate::routes::withdrawals::get_withdrawal,
        crate::routes::withdrawals::approve_withdrawal,
        crate::routes::withdrawals::reject_withdrawal,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::vendors::RegisterVendorRequest,
            crate::routes::vendors::PostEntryRequest,
            crate::routes::vendors::PostableKind,
            crate::routes::vendors::CashCollectionRequest,
            crate::routes::vendors::CashLimitRequest,
            crate::routes::vendors::VendorResponse,
            crate::routes::vendors::StatusChangeResponse,
            crate::routes::vendors::VendorListResponse,
            crate::routes::vendors::LedgerEntryResponse,
            crate::routes::vendors::LedgerPage,
            crate::routes::payouts::CreatePayoutRequest,
            crate::routes::payouts::ApproveRequest,
            crate::routes::payouts::RejectRequest,
            crate::routes::payouts::PayoutRequestResponse,
            crate::routes::payouts::TransitionResponse,
            crate::routes::payouts::PayoutListResponse,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "vendors", description = "Vendor registration, balances, ledger, cash collections and status gate"),
        (name = "settlements", description = "Settlement request lifecycle"),
        (name = "withdrawals", description = "Withdrawal request lifecycle"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json(caller: CallerIdentity) -> Result<Json<utoipa::openapi::OpenApi>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Vendor Ledger API");
    }

    #[test]
    fn spec_has_every_resource() {
        let spec = ApiDoc::openapi();
        for path in [
            "/v1/vendors",
            "/v1/vendors/{vendor_id}/ledger",
            "/v1/vendors/{vendor_id}/cash-limit",
            "/v1/settlements",
            "/v1/settlements/pending",
            "/v1/settlements/{settlement_id}/approve",
            "/v1/withdrawals",
            "/v1/withdrawals/{withdrawal_id}/reject",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn spec_registers_bearer_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}

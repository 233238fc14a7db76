//! # vledger-api: Vendor Ledger HTTP Service
//!
//! Axum service exposing the vendor ledger engine to admins and vendors.
//!
//! ## Routes
//!
//! - `/v1/vendors/*`: registration, balances, ledger view, postings,
//!   cash collections, block/unblock, cash limit
//! - `/v1/settlements/*`: settlement request lifecycle
//! - `/v1/withdrawals/*`: withdrawal request lifecycle
//! - `/openapi.json`: generated OpenAPI document (admin)
//! - `/health/*`, `/metrics`: unauthenticated probes and Prometheus scrape
//!
//! ## Middleware Stack (Tower)
//!
//! TraceLayer → Metrics → Auth → RateLimit → handler, where each handler
//! applies its own role gate and body validation.
//!
//! ## Crate Policy
//!
//! - Sits at the top of the dependency DAG.
//! - No business logic in route handlers; they delegate to `vledger-ledger`.
//! - All errors map to structured HTTP responses via `AppError`.

pub mod auth;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::{AppConfig, AppState};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};

/// Assemble the full application router.
///
/// Health probes and `/metrics` are mounted outside the auth middleware so
/// they stay reachable without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let limiter = RateLimiter::new(RateLimitConfig::per_minute(
        state.config.rate_limit_per_minute,
    ));
    let metrics = ApiMetrics::new();
    let metrics_on = state.config.metrics_enabled;

    // Auth runs before rate limiting so the limiter can key on the caller
    // and unauthenticated requests never consume quota.
    let mut api = Router::new()
        .merge(routes::vendors::router())
        .merge(routes::settlements::router())
        .merge(routes::withdrawals::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn(auth::auth_middleware));

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
    }

    let api = api
        .layer(middleware::tracing_layer::layer())
        .layer(Extension(auth_config))
        .layer(Extension(limiter))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    if metrics_on {
        unauthenticated = unauthenticated
            .route("/metrics", get(prometheus_metrics))
            .layer(Extension(metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

async fn liveness() -> &'static str {
    "ok"
}

/// Ready once the engine is up; the journal was replayed before the
/// router was built.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let head = state.engine.store().journal().head();
    tracing::debug!(journal_seq = head.seq, "readiness probe");
    "ready"
}

/// GET /metrics: refresh ledger gauges, then encode the registry.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    metrics.observe_engine(&state.engine.stats());
    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

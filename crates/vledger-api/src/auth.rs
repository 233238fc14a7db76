//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with two roles: vendors, who may act only on
//! their own ledger and requests, and admins, who may act on everything.
//!
//! ## Token Format
//!
//! ```text
//! Bearer vendor:{vendor_id}:{secret}   vendor bound to one vendor id
//! Bearer admin:{name}:{secret}         admin; name is recorded as the actor
//! Bearer {secret}                      admin without a name
//! ```
//!
//! ## Trust Model
//!
//! All three forms are checked against the single `AUTH_TOKEN` secret, and
//! the role and subject in front of it are taken as the caller states them.
//! Anyone holding the secret can therefore present `admin::{secret}` or
//! `vendor:{any_id}:{secret}`. Roles scope what a trusted client means to
//! do; they are not a boundary between mutually untrusted callers. Issue the
//! secret only to services that are allowed full admin access.
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl
//! and gate themselves with [`require_role`] and [`require_vendor_access`].

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use vledger_core::VendorId;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

/// Caller roles, ordered by privilege level (`Vendor < Admin`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can read its own ledger and open requests for itself.
    Vendor,
    /// Full access, including decisions and status changes.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vendor => "vendor",
            Self::Admin => "admin",
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// The vendor this caller is bound to. Always set for `Vendor`,
    /// never for `Admin`.
    pub vendor_id: Option<VendorId>,
    /// Admin name from the token, if any.
    pub name: Option<String>,
}

impl CallerIdentity {
    /// Unnamed admin identity, used when auth is disabled.
    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            vendor_id: None,
            name: None,
        }
    }

    pub fn vendor(vendor_id: VendorId) -> Self {
        Self {
            role: Role::Vendor,
            vendor_id: Some(vendor_id),
            name: None,
        }
    }

    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// Admins can access every vendor; vendors only themselves.
    pub fn can_access_vendor(&self, vendor_id: &VendorId) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Vendor => self.vendor_id.as_ref() == Some(vendor_id),
        }
    }

    /// Name recorded as `created_by` / `decided_by` and used as the rate
    /// limit key.
    pub fn actor(&self) -> String {
        match (self.role, &self.vendor_id, &self.name) {
            (Role::Vendor, Some(vendor_id), _) => format!("vendor:{vendor_id}"),
            (Role::Admin, _, Some(name)) => format!("admin:{name}"),
            (role, _, _) => role.as_str().to_string(),
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Check that the caller is an admin or the vendor itself.
pub fn require_vendor_access(caller: &CallerIdentity, vendor_id: &VendorId) -> Result<(), AppError> {
    if caller.can_access_vendor(vendor_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "caller may not access vendor {vendor_id}"
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets. When lengths differ a dummy
/// comparison still runs so timing does not reveal the expected length.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token in `{role}:{subject}:{secret}` or `{secret}` form.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::admin())
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, subject, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            match *role {
                "admin" => Ok(CallerIdentity {
                    name: (!subject.is_empty()).then(|| subject.to_string()),
                    ..CallerIdentity::admin()
                }),
                "vendor" => {
                    let vendor_id =
                        VendorId::new(*subject).map_err(|e| format!("invalid vendor token: {e}"))?;
                    Ok(CallerIdentity::vendor(vendor_id))
                }
                other => Err(format!("unknown role: {other}")),
            }
        }
        _ => Err("invalid token format: expected {role}:{subject}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the bearer token and inject the caller's [`CallerIdentity`].
///
/// When `AuthConfig.token` is `None` every request runs as an unnamed admin.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    let Some(AuthConfig {
        token: Some(expected),
    }) = expected_token
    else {
        request.extensions_mut().insert(CallerIdentity::admin());
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header_value) => match header_value.strip_prefix("Bearer ") {
            Some(provided) => match parse_bearer_token(provided, &expected) {
                Ok(identity) => {
                    request.extensions_mut().insert(identity);
                    next.run(request).await
                }
                Err(msg) => {
                    tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                    unauthorized_response(&msg)
                }
            },
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                unauthorized_response("authorization header must use Bearer scheme")
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn vendor(id: &str) -> VendorId {
        VendorId::new(id).unwrap()
    }

    /// Router that echoes the caller's actor name.
    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route(
                "/test",
                get(|caller: CallerIdentity| async move { caller.actor() }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig { token }))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn plain_secret_is_admin() {
        let (status, body) = call(test_app(Some("s3cret".into())), Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[tokio::test]
    async fn vendor_token_binds_vendor() {
        let (status, body) = call(
            test_app(Some("s3cret".into())),
            Some("Bearer vendor:plumber-1:s3cret"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "vendor:plumber-1");
    }

    #[tokio::test]
    async fn named_admin_token() {
        let (_, body) = call(
            test_app(Some("s3cret".into())),
            Some("Bearer admin:ops:s3cret"),
        )
        .await;
        assert_eq!(body, "admin:ops");
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, body) = call(test_app(Some("s3cret".into())), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing"));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let (status, body) = call(
            test_app(Some("s3cret".into())),
            Some("Bearer vendor:plumber-1:nope"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (status, body) = call(
            test_app(Some("s3cret".into())),
            Some("Basic dXNlcjpwYXNz"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer"));
    }

    #[tokio::test]
    async fn disabled_auth_runs_as_admin() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[test]
    fn parse_rejects_unknown_role_and_bad_vendor() {
        assert!(parse_bearer_token("root:x:s", "s").is_err());
        assert!(parse_bearer_token("vendor:bad id:s", "s").is_err());
        assert!(parse_bearer_token("vendor:x", "s").is_err());
    }

    #[test]
    fn secret_may_contain_colons() {
        let caller = parse_bearer_token("vendor:v-1:a:b", "a:b").unwrap();
        assert_eq!(caller.vendor_id, Some(vendor("v-1")));
    }

    #[test]
    fn role_and_subject_are_taken_as_stated() {
        // One secret backs every form, so its holder chooses the role.
        let admin = parse_bearer_token("admin::s", "s").unwrap();
        assert_eq!(admin, CallerIdentity::admin());
        let other = parse_bearer_token("vendor:someone-else:s", "s").unwrap();
        assert_eq!(other.vendor_id, Some(vendor("someone-else")));
    }

    #[test]
    fn vendor_access_is_limited_to_self() {
        let caller = CallerIdentity::vendor(vendor("a"));
        assert!(require_vendor_access(&caller, &vendor("a")).is_ok());
        assert!(require_vendor_access(&caller, &vendor("b")).is_err());
        assert!(require_role(&caller, Role::Admin).is_err());
        assert!(require_vendor_access(&CallerIdentity::admin(), &vendor("b")).is_ok());
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let debug = format!("{:?}", AuthConfig { token: Some("s3cret".into()) });
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("REDACTED"));
    }
}

//! Session introspection and logout.
//!
//! Sessions are stateless signed tokens; logout records the event for the
//! audit trail but there is no server-side list to revoke from. The token
//! simply ages out at its fixed expiry.

use axum::{Json, extract::Extension, http::HeaderMap, response::IntoResponse};
use std::sync::Arc;

use super::principal::require_auth;
use super::rate_limit::RateLimitScope;
use super::state::AuthState;
use super::types::{SessionResponse, SuccessResponse};
use super::utils::{extract_client_ip, extract_user_agent};
use crate::api::error::ApiError;
use crate::audit::NewAuditEvent;

#[utoipa::path(
    get,
    path = "/admin/session",
    responses(
        (status = 200, description = "Session is active.", body = SessionResponse),
        (status = 401, description = "Missing or invalid token."),
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.enforce_rate_limit(&headers, RateLimitScope::General)?;
    let principal = require_auth(&headers, &state).await?;
    Ok(Json(SessionResponse {
        user_id: principal.id.to_string(),
        email: principal.email,
        is_super_admin: principal.is_super_admin,
    }))
}

#[utoipa::path(
    post,
    path = "/admin/logout",
    responses(
        (status = 200, description = "Logged out.", body = SuccessResponse),
        (status = 401, description = "Missing or invalid token."),
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.enforce_rate_limit(&headers, RateLimitScope::General)?;
    let principal = require_auth(&headers, &state).await?;

    state.audit().record(
        NewAuditEvent::new("logout", "auth")
            .actor(principal.id)
            .resource_id(principal.id.to_string())
            .client(extract_client_ip(&headers), extract_user_agent(&headers)),
    );

    Ok(Json(SuccessResponse { success: true }))
}

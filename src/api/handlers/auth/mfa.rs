//! TOTP second-factor enrollment and teardown.
//!
//! Flow Overview:
//! 1) `setup` generates a secret and stages it as *pending*; nothing about
//!    the login flow changes yet.
//! 2) `verify` checks the first code against the pending secret; success
//!    promotes it and enables MFA, failure leaves the pending value staged
//!    for retry (abuse bounded by the login-scope rate limiter).
//! 3) `disable` clears both secrets for an already-authenticated caller.

use axum::{Json, extract::Extension, http::HeaderMap, response::IntoResponse};
use std::sync::Arc;
use tracing::info;

use super::principal::require_auth;
use super::rate_limit::RateLimitScope;
use super::state::AuthState;
use super::types::{MfaSetupResponse, MfaVerifyRequest, SuccessResponse};
use super::utils::{extract_client_ip, extract_user_agent};
use crate::api::error::ApiError;
use crate::audit::NewAuditEvent;

#[utoipa::path(
    post,
    path = "/admin/mfa/setup",
    responses(
        (status = 200, description = "Secret staged; scan and confirm.", body = MfaSetupResponse),
        (status = 401, description = "Missing or invalid token."),
    ),
    tag = "mfa"
)]
pub async fn setup(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.enforce_rate_limit(&headers, RateLimitScope::General)?;
    let principal = require_auth(&headers, &state).await?;

    let provisioned = state
        .totp()
        .provision(&principal.email)
        .map_err(ApiError::Internal)?;

    // Staged only; the identity keeps logging in without MFA until the
    // first code confirms the secret.
    state
        .store()
        .set_pending_mfa_secret(principal.id, &provisioned.secret_base32)
        .await
        .map_err(ApiError::Internal)?;

    Ok(Json(MfaSetupResponse {
        secret: provisioned.secret_base32,
        otpauth_url: provisioned.otpauth_url,
        qr_code: provisioned.qr_code,
    }))
}

#[utoipa::path(
    post,
    path = "/admin/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "MFA enabled.", body = SuccessResponse),
        (status = 400, description = "No pending setup or invalid code.", body = String),
        (status = 401, description = "Missing or invalid token."),
        (status = 429, description = "Rate limited."),
    ),
    tag = "mfa"
)]
pub async fn verify(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<MfaVerifyRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    // Confirmation shares the strict login window: it is the only brake on
    // guessing codes against a staged secret.
    state.enforce_rate_limit(&headers, RateLimitScope::Login)?;
    let principal = require_auth(&headers, &state).await?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };
    let code = request.totp_code.trim();
    if code.is_empty() {
        return Err(ApiError::Validation("Missing TOTP code".to_string()));
    }

    let identity = state
        .store()
        .find_by_id(principal.id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::InvalidToken)?;
    let Some(pending) = identity.mfa_pending_secret.as_deref() else {
        return Err(ApiError::Validation("No pending MFA setup".to_string()));
    };

    let valid = state
        .totp()
        .verify(pending, &identity.email, code)
        .unwrap_or(false);
    if !valid {
        // Pending secret stays staged so the caller can retry.
        return Err(ApiError::Validation("Invalid TOTP code".to_string()));
    }

    let confirmed = state
        .store()
        .confirm_mfa(principal.id)
        .await
        .map_err(ApiError::Internal)?;
    if !confirmed {
        // A concurrent confirm or disable consumed the pending secret.
        return Err(ApiError::Validation("No pending MFA setup".to_string()));
    }

    state.audit().record(
        NewAuditEvent::new("mfa_enabled", "auth")
            .actor(principal.id)
            .resource_id(principal.id.to_string())
            .client(extract_client_ip(&headers), extract_user_agent(&headers)),
    );
    info!(admin_id = %principal.id, "MFA enabled");

    Ok(Json(SuccessResponse { success: true }))
}

#[utoipa::path(
    post,
    path = "/admin/mfa/disable",
    responses(
        (status = 200, description = "MFA disabled.", body = SuccessResponse),
        (status = 401, description = "Missing or invalid token."),
    ),
    tag = "mfa"
)]
pub async fn disable(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.enforce_rate_limit(&headers, RateLimitScope::General)?;
    let principal = require_auth(&headers, &state).await?;

    state
        .store()
        .disable_mfa(principal.id)
        .await
        .map_err(ApiError::Internal)?;

    state.audit().record(
        NewAuditEvent::new("mfa_disabled", "auth")
            .actor(principal.id)
            .resource_id(principal.id.to_string())
            .client(extract_client_ip(&headers), extract_user_agent(&headers)),
    );
    info!(admin_id = %principal.id, "MFA disabled");

    Ok(Json(SuccessResponse { success: true }))
}

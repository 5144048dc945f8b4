//! Credential login with progressive lockout and optional TOTP.
//!
//! State machine: `Unauthenticated → Authenticated` (no MFA), or
//! `Unauthenticated → MFAPending → Authenticated` (MFA enabled). Any invalid
//! attempt records a failure, which may transition the identity to `Locked`;
//! a lock rejects every attempt until it elapses.
//!
//! Security boundaries:
//! - Unknown, inactive, wrong-password, and bad-TOTP outcomes all return the
//!   same generic 401; only the lock state is surfaced distinctly (423).
//! - The lock gate runs before the password is evaluated.
//! - A full success resets the attempt counter and records exactly one
//!   `login` audit event.

use axum::{Json, extract::Extension, http::HeaderMap, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::rate_limit::RateLimitScope;
use super::state::AuthState;
use super::types::{AdminUserResponse, LoginRequest, LoginResponse};
use super::utils::{extract_client_ip, extract_user_agent, normalize_email, valid_email,
    verify_password};
use crate::api::error::ApiError;
use crate::audit::NewAuditEvent;
use crate::store::AdminIdentity;

#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; session token issued.", body = LoginResponse),
        (status = 400, description = "Validation error or MFA required.", body = String),
        (status = 401, description = "Invalid credentials.", body = String),
        (status = 423, description = "Account locked.", body = String),
        (status = 429, description = "Rate limited.", body = String),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    // Rate limiting runs first, independent of auth outcome.
    state.enforce_rate_limit(&headers, RateLimitScope::Login)?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("Missing payload".to_string()));
    };
    let email = normalize_email(&request.email);
    if !valid_email(&email) || request.password.is_empty() {
        return Err(ApiError::Validation("Invalid email or password".to_string()));
    }

    // Unknown and inactive identities take the same path as a bad password.
    let identity = state
        .store()
        .find_by_email(&email)
        .await
        .map_err(ApiError::Internal)?
        .filter(|identity| identity.is_active)
        .ok_or(ApiError::InvalidCredentials)?;

    // The lock gate runs before the password is evaluated.
    let now = Utc::now();
    if identity.locked(now) {
        let retry_after_seconds = identity
            .locked_until
            .map(|until| (until - now).num_seconds().max(0))
            .unwrap_or_default();
        return Err(ApiError::Locked {
            retry_after_seconds,
        });
    }

    if !verify_password(&request.password, &identity.password_hash) {
        return Err(record_failure(&state, &identity).await);
    }

    if identity.mfa_enabled {
        let Some(code) = request.mfa_code.as_deref().map(str::trim).filter(|code| !code.is_empty())
        else {
            // Password was right, but no token is issued without the second
            // factor.
            return Err(ApiError::MfaRequired);
        };
        let Some(secret) = identity.mfa_secret.as_deref() else {
            error!(admin_id = %identity.id, "MFA enabled without a stored secret");
            return Err(ApiError::InvalidCredentials);
        };
        let valid = state
            .totp()
            .verify(secret, &identity.email, code)
            .unwrap_or(false);
        if !valid {
            return Err(record_failure(&state, &identity).await);
        }
    }

    state
        .store()
        .record_login_success(identity.id)
        .await
        .map_err(ApiError::Internal)?;

    let issued = state
        .token_signer()
        .issue(identity.id, &identity.email, identity.is_super_admin)
        .map_err(ApiError::Internal)?;

    state.audit().record(
        NewAuditEvent::new("login", "auth")
            .actor(identity.id)
            .resource_id(identity.id.to_string())
            .new_values(json!({ "email": identity.email }))
            .client(extract_client_ip(&headers), extract_user_agent(&headers)),
    );
    info!(admin_id = %identity.id, "Admin login succeeded");

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: AdminUserResponse::from(&identity),
    }))
}

/// Record one failed attempt. The caller returns the same generic error
/// whether or not this attempt triggered the lock.
async fn record_failure(state: &AuthState, identity: &AdminIdentity) -> ApiError {
    let result = state
        .store()
        .record_login_failure(
            identity.id,
            state.config().max_login_attempts(),
            state.config().lockout_seconds(),
        )
        .await;
    match result {
        Ok(attempt) => {
            if attempt.locked_until.is_some() {
                info!(admin_id = %identity.id, attempts = attempt.login_attempts,
                    "Admin account locked after repeated failures");
            }
        }
        Err(err) => {
            // The counter could not move, but the response still denies.
            error!("Failed to record login failure: {err}");
        }
    }
    ApiError::InvalidCredentials
}

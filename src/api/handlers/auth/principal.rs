//! Authenticated principal extraction and the authorization guard.
//!
//! Flow Overview: validate the bearer token's signature and expiry first
//! (no store lookup on failure), then re-fetch the identity so deactivation
//! takes effect immediately, then resolve current role grants for the
//! required permission set.
//!
//! The principal is request-scoped and passed explicitly through the call
//! chain; there is no process-wide "current user".

use axum::http::HeaderMap;
use uuid::Uuid;

use super::state::AuthState;
use super::utils::extract_bearer_token;
use crate::api::error::ApiError;
use crate::authz::{self, AccessDecision};
use crate::store::AdminIdentity;

/// Authenticated admin context derived from a verified bearer token plus a
/// fresh identity fetch.
#[derive(Clone, Debug)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub role_id: Option<Uuid>,
    pub is_super_admin: bool,
}

impl From<&AdminIdentity> for Principal {
    fn from(identity: &AdminIdentity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            role_id: identity.role_id,
            is_super_admin: identity.is_super_admin,
        }
    }
}

/// Resolve the bearer token into a live identity.
///
/// # Errors
/// - `MissingToken` when no bearer token is presented.
/// - `InvalidToken` for any signature/expiry failure, unknown subject, or a
///   deactivated identity (a deactivated admin is rejected even though the
///   token itself is still cryptographically valid).
pub(crate) async fn authenticate(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<AdminIdentity, ApiError> {
    let token = extract_bearer_token(headers).ok_or(ApiError::MissingToken)?;
    let claims = state
        .token_signer()
        .verify(&token)
        .map_err(|_| ApiError::InvalidToken)?;

    let identity = state
        .store()
        .find_by_id(claims.subject)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::InvalidToken)?;
    if !identity.is_active {
        return Err(ApiError::InvalidToken);
    }
    Ok(identity)
}

/// Authenticate only; no permission requirement.
///
/// # Errors
/// See [`authenticate`].
pub async fn require_auth(headers: &HeaderMap, state: &AuthState) -> Result<Principal, ApiError> {
    authenticate(headers, state)
        .await
        .map(|identity| Principal::from(&identity))
}

/// Authenticate and require any of the listed permissions.
///
/// Grants are re-read from the store on every call; a grant change is
/// visible on the very next request. Store failures deny (fail closed).
///
/// # Errors
/// Authentication errors as in [`authenticate`]; `Forbidden` when the
/// caller's role holds none of the required permissions.
pub async fn require_permissions(
    headers: &HeaderMap,
    state: &AuthState,
    required: &[&str],
) -> Result<Principal, ApiError> {
    let identity = authenticate(headers, state).await?;
    match authz::authorize(state.store(), &identity, required).await {
        Ok(AccessDecision::Allowed) => Ok(Principal::from(&identity)),
        Ok(AccessDecision::Denied) => Err(ApiError::Forbidden),
        Err(err) => Err(ApiError::Internal(err)),
    }
}

//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::AdminIdentity;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    pub user: AdminUserResponse,
}

/// Public projection of an admin identity. Never carries hashes or secrets.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AdminUserResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub is_super_admin: bool,
    pub mfa_enabled: bool,
}

impl From<&AdminIdentity> for AdminUserResponse {
    fn from(identity: &AdminIdentity) -> Self {
        Self {
            id: identity.id.to_string(),
            email: identity.email.clone(),
            full_name: identity.full_name.clone(),
            is_super_admin: identity.is_super_admin,
            mfa_enabled: identity.mfa_enabled,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub is_super_admin: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
    /// PNG QR code as a data URL, ready for an <img> tag.
    pub qr_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaVerifyRequest {
    pub totp_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SuccessResponse {
    pub success: bool,
}

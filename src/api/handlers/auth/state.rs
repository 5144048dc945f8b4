//! Auth state and configuration shared by the admin handlers.

use axum::http::HeaderMap;
use std::sync::Arc;

use super::rate_limit::{RateLimitDecision, RateLimitScope, RateLimiter};
use super::utils::extract_client_ip;
use crate::api::error::ApiError;
use crate::audit::AuditRecorder;
use crate::store::CredentialStore;
use crate::token::SessionTokenSigner;
use crate::totp::TotpProvisioner;

const DEFAULT_MAX_LOGIN_ATTEMPTS: i32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 30 * 60;
const DEFAULT_TOTP_ISSUER: &str = "Gardisto Admin";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    totp_issuer: String,
    max_login_attempts: i32,
    lockout_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: i32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> i32 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn lockout_seconds(&self) -> i64 {
        self.lockout_seconds
    }
}

/// Everything a handler needs, injected once at wiring time. Handler logic
/// is identical across environments; only the store/sink/limiter wiring
/// changes.
pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn CredentialStore>,
    audit: AuditRecorder,
    rate_limiter: Arc<dyn RateLimiter>,
    token_signer: SessionTokenSigner,
    totp: TotpProvisioner,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        audit: AuditRecorder,
        rate_limiter: Arc<dyn RateLimiter>,
        token_signer: SessionTokenSigner,
    ) -> Self {
        let totp = TotpProvisioner::new(config.totp_issuer().to_string());
        Self {
            config,
            store,
            audit,
            rate_limiter,
            token_signer,
            totp,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    #[must_use]
    pub fn token_signer(&self) -> &SessionTokenSigner {
        &self.token_signer
    }

    #[must_use]
    pub fn totp(&self) -> &TotpProvisioner {
        &self.totp
    }

    /// Apply the per-IP window for this scope. Runs before any auth logic so
    /// the 429 is independent of authentication outcome.
    ///
    /// # Errors
    /// Returns `ApiError::RateLimited` when the window is exhausted.
    pub fn enforce_rate_limit(
        &self,
        headers: &HeaderMap,
        scope: RateLimitScope,
    ) -> Result<(), ApiError> {
        let ip = extract_client_ip(headers);
        match self.rate_limiter.check(ip.as_deref(), scope) {
            RateLimitDecision::Allowed => Ok(()),
            RateLimitDecision::Limited => Err(ApiError::RateLimited),
        }
    }
}

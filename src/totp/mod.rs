//! TOTP provisioning and verification.
//!
//! Standard parameters throughout: SHA1, 6 digits, 30 second step, and a
//! skew of one step so codes from the adjacent window are accepted.

use anyhow::{Result, anyhow};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP: u64 = 30;

/// A freshly generated enrollment, returned to the caller once; the server
/// keeps only the secret (staged as pending until confirmed).
#[derive(Clone, Debug)]
pub struct Provisioned {
    pub secret_base32: String,
    pub otpauth_url: String,
    /// PNG QR code as a `data:image/png;base64,...` URL.
    pub qr_code: String,
}

/// Builds provisioning material and checks codes for one issuer.
#[derive(Clone, Debug)]
pub struct TotpProvisioner {
    issuer: String,
}

impl TotpProvisioner {
    #[must_use]
    pub fn new(issuer: String) -> Self {
        Self { issuer }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Generate a new random secret with scannable provisioning material.
    ///
    /// # Errors
    /// Returns an error if secret generation or QR rendering fails.
    pub fn provision(&self, account: &str) -> Result<Provisioned> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|err| anyhow!("Secret gen error: {err}"))?;
        let totp = TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|err| anyhow!("TOTP init error: {err}"))?;

        let qr = totp
            .get_qr_base64()
            .map_err(|err| anyhow!("QR gen error: {err}"))?;

        Ok(Provisioned {
            otpauth_url: totp.get_url(),
            qr_code: format!("data:image/png;base64,{qr}"),
            secret_base32: totp.get_secret_base32(),
        })
    }

    /// Check a code against a stored base32 secret at the current time.
    ///
    /// # Errors
    /// Returns an error if the secret cannot be decoded or the system clock
    /// is unavailable; callers treat errors as a failed check.
    pub fn verify(&self, secret_base32: &str, account: &str, code: &str) -> Result<bool> {
        let totp = build(secret_base32, &self.issuer, account)?;
        totp.check_current(code)
            .map_err(|err| anyhow!("system time unavailable: {err}"))
    }
}

/// Build the TOTP instance used for both provisioning and checks.
///
/// # Errors
/// Returns an error if the secret is not valid base32 or is too short.
pub fn build(secret_base32: &str, issuer: &str, account: &str) -> Result<TOTP> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|err| anyhow!("invalid TOTP secret: {err}"))?;
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|err| anyhow!("TOTP init error: {err}"))
}

//! PASETO v4.public session token minting and verification.
//!
//! Flow Overview:
//! 1) Build session claims with RFC3339 timestamps and a fixed TTL.
//! 2) Sign with a server-held Ed25519 key.
//! 3) Verify statelessly on every protected request: signature and expiry
//!    first, identity re-fetch afterwards (in the principal layer).
//!
//! There is no server-side revocation list; deactivating an identity takes
//! effect because verification is always followed by an `is_active` check.

use anyhow::{Context, Result, anyhow};
use ed25519_dalek::SigningKey;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::{AsymmetricPublicKey, AsymmetricSecretKey};
use pasetors::token::UntrustedToken;
use pasetors::{Public, public, version4::V4};
use rand::RngCore;
use rand::rngs::OsRng;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

const ISSUER: &str = "gardisto:admin";
const AUDIENCE: &str = "gardisto:admin";

/// Fixed session lifetime.
pub const SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

/// A minted bearer token with its expiry, both handed to the client.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: String,
}

/// Claims recovered from a verified token.
#[derive(Clone, Debug)]
pub struct SessionClaims {
    pub subject: Uuid,
    pub email: String,
    pub is_super_admin: bool,
}

/// Signs and verifies session tokens with one Ed25519 key.
#[derive(Debug)]
pub struct SessionTokenSigner {
    secret_key: AsymmetricSecretKey<V4>,
    public_key: AsymmetricPublicKey<V4>,
}

impl SessionTokenSigner {
    /// Build a signer from a 32-byte Ed25519 seed.
    ///
    /// # Errors
    /// Returns an error if the seed cannot be used as a key.
    pub fn from_seed(seed: [u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(&seed);
        let secret_key = AsymmetricSecretKey::from(&signing_key.to_keypair_bytes())
            .map_err(|err| anyhow!("invalid session signing key: {err}"))?;
        let public_key = AsymmetricPublicKey::from(signing_key.verifying_key().as_bytes())
            .map_err(|err| anyhow!("invalid session verifying key: {err}"))?;
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    /// Build a signer with a randomly generated key. Tokens do not survive a
    /// process restart with an ephemeral key; pass a configured seed when
    /// that matters.
    ///
    /// # Errors
    /// Returns an error if key construction fails.
    pub fn ephemeral() -> Result<Self> {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Mint a token for the given identity with the fixed session TTL.
    ///
    /// # Errors
    /// Returns an error if timestamp formatting or signing fails.
    pub fn issue(&self, subject: Uuid, email: &str, is_super_admin: bool) -> Result<IssuedToken> {
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::seconds(SESSION_TTL_SECONDS);

        // Format without nanoseconds for cleaner interop.
        let iat = now
            .replace_nanosecond(0)
            .context("strip iat nanoseconds")?
            .format(&Rfc3339)
            .context("format iat")?;
        let expires_at = exp
            .replace_nanosecond(0)
            .context("strip exp nanoseconds")?
            .format(&Rfc3339)
            .context("format exp")?;

        let mut claims = Claims::new().map_err(|err| anyhow!("claims init failed: {err}"))?;
        claims
            .issuer(ISSUER)
            .map_err(|err| anyhow!("set issuer: {err}"))?;
        claims
            .audience(AUDIENCE)
            .map_err(|err| anyhow!("set audience: {err}"))?;
        claims
            .subject(&subject.to_string())
            .map_err(|err| anyhow!("set subject: {err}"))?;
        claims
            .issued_at(&iat)
            .map_err(|err| anyhow!("set iat: {err}"))?;
        claims
            .not_before(&iat)
            .map_err(|err| anyhow!("set nbf: {err}"))?;
        claims
            .expiration(&expires_at)
            .map_err(|err| anyhow!("set exp: {err}"))?;
        claims
            .add_additional("email", serde_json::Value::from(email))
            .map_err(|err| anyhow!("set email claim: {err}"))?;
        claims
            .add_additional("super_admin", serde_json::Value::from(is_super_admin))
            .map_err(|err| anyhow!("set super_admin claim: {err}"))?;

        let token = public::sign(&self.secret_key, &claims, None, None)
            .map_err(|err| anyhow!("token signing failed: {err}"))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify signature, expiry, issuer, and audience, then decode claims.
    ///
    /// # Errors
    /// Returns an error for any malformed, forged, or expired token. Callers
    /// map every failure to the same 401.
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let untrusted = UntrustedToken::<Public, V4>::try_from(token)
            .map_err(|err| anyhow!("malformed token: {err}"))?;

        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(ISSUER);
        rules.validate_audience_with(AUDIENCE);

        let trusted = public::verify(&self.public_key, &untrusted, &rules, None, None)
            .map_err(|err| anyhow!("token verification failed: {err}"))?;
        let claims = trusted
            .payload_claims()
            .ok_or_else(|| anyhow!("token carries no claims"))?;

        let subject = claims
            .get_claim("sub")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| anyhow!("token missing subject"))?;
        let email = claims
            .get_claim("email")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| anyhow!("token missing email"))?;
        let is_super_admin = claims
            .get_claim("super_admin")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        Ok(SessionClaims {
            subject: Uuid::parse_str(subject).context("invalid subject in token")?,
            email: email.to_string(),
            is_super_admin,
        })
    }
}

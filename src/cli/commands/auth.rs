use anyhow::{Context, Result, anyhow};
use base64::{Engine, engine::general_purpose};
use clap::{Arg, Command};

pub const ARG_FRONTEND_URL: &str = "frontend-url";
pub const ARG_TOTP_ISSUER: &str = "totp-issuer";
pub const ARG_MAX_LOGIN_ATTEMPTS: &str = "max-login-attempts";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";
pub const ARG_SESSION_KEY: &str = "session-key";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_URL)
                .long(ARG_FRONTEND_URL)
                .help("Admin panel origin allowed by CORS")
                .env("GARDISTO_FRONTEND_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_TOTP_ISSUER)
                .long(ARG_TOTP_ISSUER)
                .help("Issuer shown in authenticator apps")
                .env("GARDISTO_TOTP_ISSUER")
                .default_value("Gardisto Admin"),
        )
        .arg(
            Arg::new(ARG_MAX_LOGIN_ATTEMPTS)
                .long(ARG_MAX_LOGIN_ATTEMPTS)
                .help("Failed attempts before the account locks")
                .env("GARDISTO_MAX_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("Lockout duration in seconds")
                .env("GARDISTO_LOCKOUT_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SESSION_KEY)
                .long(ARG_SESSION_KEY)
                .help("Base64 32-byte Ed25519 seed for session tokens")
                .long_help(
                    "Base64 32-byte Ed25519 seed used to sign session tokens. When omitted, a \
                     random key is generated and all sessions die with the process.",
                )
                .env("GARDISTO_SESSION_KEY"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub totp_issuer: String,
    pub max_login_attempts: i32,
    pub lockout_seconds: i64,
    pub session_seed: Option<[u8; 32]>,
}

impl Options {
    /// Extract auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if the session key is not valid base64 of 32 bytes.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let session_seed = matches
            .get_one::<String>(ARG_SESSION_KEY)
            .map(|raw| decode_seed(raw))
            .transpose()?;

        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_URL)
                .cloned()
                .context("missing required argument: --frontend-url")?,
            totp_issuer: matches
                .get_one::<String>(ARG_TOTP_ISSUER)
                .cloned()
                .context("missing required argument: --totp-issuer")?,
            max_login_attempts: matches
                .get_one::<i32>(ARG_MAX_LOGIN_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            lockout_seconds: matches
                .get_one::<i64>(ARG_LOCKOUT_SECONDS)
                .copied()
                .unwrap_or(1800),
            session_seed,
        })
    }
}

fn decode_seed(raw: &str) -> Result<[u8; 32]> {
    let bytes = general_purpose::STANDARD
        .decode(raw.trim())
        .context("session key is not valid base64")?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("session key must decode to exactly 32 bytes"))
}

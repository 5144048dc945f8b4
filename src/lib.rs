//! # Gardisto (Admin Authentication & Authorization Core)
//!
//! `gardisto` is the security core of a hosted administration panel. It
//! owns credential login with progressive lockout, optional TOTP second
//! factors, stateless signed bearer sessions, role-based permission
//! resolution, and the append-only audit trail behind every administrative
//! action.
//!
//! ## Login & Lockout
//!
//! Login is a small state machine: `Unauthenticated → Authenticated`, with
//! an `MFAPending` stop when a second factor is enrolled. Five failed
//! attempts lock the identity for 30 minutes; the lock gate runs before the
//! password is ever evaluated. Unknown accounts, inactive accounts, wrong
//! passwords, and bad TOTP codes are indistinguishable from the outside.
//!
//! ## Sessions & Authorization
//!
//! Sessions are PASETO `v4.public` tokens with a fixed 24 hour expiry,
//! verified statelessly. Every protected request re-fetches the identity
//! (so deactivation bites immediately) and re-reads the role's grants (so a
//! permission change is visible on the very next request). Endpoints list
//! the permissions that may satisfy them; holding any one is enough, and
//! super admins bypass the check.
//!
//! ## Audit Trail
//!
//! Each state-changing operation appends exactly one immutable audit event
//! after its primary effect, on a task detached from the request. The sink
//! is best-effort: failures are logged and swallowed, never surfaced.

pub mod api;
pub mod audit;
pub mod authz;
pub mod cli;
pub mod store;
pub mod token;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

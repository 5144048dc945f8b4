//! Auth handlers and supporting modules.
//!
//! This module coordinates credential login, session tokens, MFA, and the
//! permission guard that every protected route goes through.
//!
//! ## Lockout
//!
//! Five failed attempts lock an identity for 30 minutes. The lock gate runs
//! before the password is evaluated and is surfaced distinctly (423), a
//! documented tradeoff against account enumeration.
//!
//! ## Rate Limiting
//!
//! Fixed per-IP windows, checked before any auth logic: 100 requests per
//! 15 minutes for the general API, 5 per minute for the login flow (which
//! also brakes MFA confirmation attempts).

pub(crate) mod login;
pub(crate) mod mfa;
pub(crate) mod principal;
mod rate_limit;
pub(crate) mod session;
mod state;
pub(crate) mod types;
mod utils;

pub use principal::{Principal, require_auth, require_permissions};
pub use rate_limit::{
    NoopRateLimiter, RateLimitDecision, RateLimitScope, RateLimiter, WindowRateLimiter,
};
pub use state::{AuthConfig, AuthState};
pub use utils::{hash_password, verify_password};

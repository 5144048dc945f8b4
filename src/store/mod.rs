//! Persistence seam for the auth core.
//!
//! Handlers never talk to a database directly; they go through the
//! [`CredentialStore`] and [`AuditSink`] traits so the production Postgres
//! implementation and the in-memory test double are interchangeable wiring.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditQuery, NewAuditEvent};

pub use memory::{MemoryAuditSink, MemoryStore};
pub use postgres::{PgAuditSink, PgStore};

/// A persisted admin identity, as the auth core needs it.
#[derive(Clone, Debug)]
pub struct AdminIdentity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role_id: Option<Uuid>,
    pub is_super_admin: bool,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub mfa_pending_secret: Option<String>,
    pub login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl AdminIdentity {
    /// Whether a lockout is currently in force.
    #[must_use]
    pub fn locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Result of recording a failed login attempt.
#[derive(Clone, Copy, Debug)]
pub struct FailedAttempt {
    pub login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Identity and role-grant persistence.
///
/// `record_login_failure` must be atomic per identity (conditional update at
/// the store); concurrent failures on the same identity are last-write-wins
/// on the counter, which can only move the lockout slightly early or late.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminIdentity>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminIdentity>>;

    /// Increment the attempt counter; set `locked_until` when the counter
    /// reaches `max_attempts`. Returns the post-update state.
    async fn record_login_failure(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_seconds: i64,
    ) -> Result<FailedAttempt>;

    /// Reset the attempt counter, clear any lock, and stamp `last_login_at`.
    async fn record_login_success(&self, id: Uuid) -> Result<()>;

    /// Stage a generated TOTP secret without enabling MFA.
    async fn set_pending_mfa_secret(&self, id: Uuid, secret: &str) -> Result<()>;

    /// Promote the pending secret to the active one and enable MFA.
    /// Returns `false` when no pending secret was staged.
    async fn confirm_mfa(&self, id: Uuid) -> Result<bool>;

    /// Clear active and pending secrets and disable MFA.
    async fn disable_mfa(&self, id: Uuid) -> Result<()>;

    /// Current granted permission set for a role. A role with no grant rows
    /// resolves to the empty set.
    async fn role_permissions(&self, role_id: Uuid) -> Result<HashSet<String>>;
}

/// Append-only audit event persistence.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one immutable event, stamped with the sink's clock.
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent>;

    /// Query events, newest first.
    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>>;
}

#[cfg(test)]
mod tests {
    use super::AdminIdentity;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn identity() -> AdminIdentity {
        AdminIdentity {
            id: Uuid::new_v4(),
            email: "admin@example.com".to_string(),
            password_hash: String::new(),
            full_name: "Admin".to_string(),
            role_id: None,
            is_super_admin: false,
            is_active: true,
            mfa_enabled: false,
            mfa_secret: None,
            mfa_pending_secret: None,
            login_attempts: 0,
            locked_until: None,
            last_login_at: None,
        }
    }

    #[test]
    fn locked_only_while_lock_is_in_the_future() {
        let now = Utc::now();
        let mut admin = identity();
        assert!(!admin.locked(now));

        admin.locked_until = Some(now + Duration::minutes(30));
        assert!(admin.locked(now));

        admin.locked_until = Some(now - Duration::seconds(1));
        assert!(!admin.locked(now));
    }
}

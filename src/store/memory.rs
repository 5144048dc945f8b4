//! In-memory store implementations.
//!
//! Used by the test suite and by local development wiring; handler logic is
//! identical against Postgres, only the wiring changes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{AdminIdentity, AuditSink, CredentialStore, FailedAttempt};
use crate::audit::{AuditEvent, AuditQuery, NewAuditEvent};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`CredentialStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: Mutex<HashMap<Uuid, AdminIdentity>>,
    grants: Mutex<HashMap<Uuid, Vec<(String, bool)>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_identity(&self, identity: AdminIdentity) {
        lock(&self.identities).insert(identity.id, identity);
    }

    /// Add or replace a grant row for a role.
    pub fn set_grant(&self, role_id: Uuid, permission: &str, granted: bool) {
        let mut grants = lock(&self.grants);
        let rows = grants.entry(role_id).or_default();
        if let Some(row) = rows.iter_mut().find(|(name, _)| name == permission) {
            row.1 = granted;
        } else {
            rows.push((permission.to_string(), granted));
        }
    }

    /// Snapshot of an identity, for assertions.
    #[must_use]
    pub fn identity(&self, id: Uuid) -> Option<AdminIdentity> {
        lock(&self.identities).get(&id).cloned()
    }

    pub fn set_active(&self, id: Uuid, is_active: bool) {
        if let Some(identity) = lock(&self.identities).get_mut(&id) {
            identity.is_active = is_active;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminIdentity>> {
        Ok(lock(&self.identities)
            .values()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminIdentity>> {
        Ok(lock(&self.identities).get(&id).cloned())
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_seconds: i64,
    ) -> Result<FailedAttempt> {
        let mut identities = lock(&self.identities);
        let Some(identity) = identities.get_mut(&id) else {
            return Ok(FailedAttempt {
                login_attempts: 0,
                locked_until: None,
            });
        };
        identity.login_attempts += 1;
        if identity.login_attempts >= max_attempts {
            identity.locked_until = Some(Utc::now() + Duration::seconds(lock_seconds));
        }
        Ok(FailedAttempt {
            login_attempts: identity.login_attempts,
            locked_until: identity.locked_until,
        })
    }

    async fn record_login_success(&self, id: Uuid) -> Result<()> {
        let mut identities = lock(&self.identities);
        if let Some(identity) = identities.get_mut(&id) {
            identity.login_attempts = 0;
            identity.locked_until = None;
            identity.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_pending_mfa_secret(&self, id: Uuid, secret: &str) -> Result<()> {
        let mut identities = lock(&self.identities);
        if let Some(identity) = identities.get_mut(&id) {
            identity.mfa_pending_secret = Some(secret.to_string());
        }
        Ok(())
    }

    async fn confirm_mfa(&self, id: Uuid) -> Result<bool> {
        let mut identities = lock(&self.identities);
        let Some(identity) = identities.get_mut(&id) else {
            return Ok(false);
        };
        let Some(pending) = identity.mfa_pending_secret.take() else {
            return Ok(false);
        };
        identity.mfa_secret = Some(pending);
        identity.mfa_enabled = true;
        Ok(true)
    }

    async fn disable_mfa(&self, id: Uuid) -> Result<()> {
        let mut identities = lock(&self.identities);
        if let Some(identity) = identities.get_mut(&id) {
            identity.mfa_secret = None;
            identity.mfa_pending_secret = None;
            identity.mfa_enabled = false;
        }
        Ok(())
    }

    async fn role_permissions(&self, role_id: Uuid) -> Result<HashSet<String>> {
        Ok(lock(&self.grants)
            .get(&role_id)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, granted)| *granted)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// In-memory [`AuditSink`].
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in insertion order, for assertions.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent> {
        let stored = AuditEvent {
            id: Uuid::new_v4(),
            actor_id: event.actor_id,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            old_values: event.old_values,
            new_values: event.new_values,
            ip: event.ip,
            user_agent: event.user_agent,
            created_at: Utc::now(),
        };
        lock(&self.events).push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let events = lock(&self.events);
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|event| matches(event, query))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            matched.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(matched)
    }
}

fn matches(event: &AuditEvent, query: &AuditQuery) -> bool {
    if let Some(action) = &query.action {
        if &event.action != action {
            return false;
        }
    }
    if let Some(resource_type) = &query.resource_type {
        if &event.resource_type != resource_type {
            return false;
        }
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        let haystack = format!(
            "{} {} {}",
            event.action,
            event.resource_type,
            event.resource_id.as_deref().unwrap_or_default()
        )
        .to_lowercase();
        if !haystack.contains(&needle) {
            return false;
        }
    }
    if let Some(from) = query.from {
        if event.created_at < from {
            return false;
        }
    }
    if let Some(to) = query.to {
        if event.created_at > to {
            return false;
        }
    }
    true
}

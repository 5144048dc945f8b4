//! Postgres-backed store implementations.
//!
//! Schema lives in `db/sql/01_gardisto.sql`. All writes that feed the login
//! state machine are single conditional statements, so per-identity
//! serialization happens at the database and no in-process locking is needed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use tracing::Instrument;
use uuid::Uuid;

use super::{AdminIdentity, AuditSink, CredentialStore, FailedAttempt};
use crate::audit::{AuditEvent, AuditQuery, NewAuditEvent};

const DEFAULT_QUERY_LIMIT: i64 = 500;

/// Postgres [`CredentialStore`].
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const IDENTITY_COLUMNS: &str = r"
    id, email, password_hash, full_name, role_id, is_super_admin, is_active,
    mfa_enabled, mfa_secret, mfa_pending_secret, login_attempts, locked_until,
    last_login_at
";

fn identity_from_row(row: &sqlx::postgres::PgRow) -> AdminIdentity {
    AdminIdentity {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        role_id: row.get("role_id"),
        is_super_admin: row.get("is_super_admin"),
        is_active: row.get("is_active"),
        mfa_enabled: row.get("mfa_enabled"),
        mfa_secret: row.get("mfa_secret"),
        mfa_pending_secret: row.get("mfa_pending_secret"),
        login_attempts: row.get("login_attempts"),
        locked_until: row.get("locked_until"),
        last_login_at: row.get("last_login_at"),
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminIdentity>> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM admin_users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup admin by email")?;
        Ok(row.as_ref().map(identity_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminIdentity>> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM admin_users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup admin by id")?;
        Ok(row.as_ref().map(identity_from_row))
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_seconds: i64,
    ) -> Result<FailedAttempt> {
        // Single conditional update; the lock is set in the same statement
        // that moves the counter past the threshold.
        let query = r"
            UPDATE admin_users
            SET login_attempts = login_attempts + 1,
                locked_until = CASE
                    WHEN login_attempts + 1 >= $2
                        THEN NOW() + ($3 * INTERVAL '1 second')
                    ELSE locked_until
                END
            WHERE id = $1
            RETURNING login_attempts, locked_until
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        let row = sqlx::query(query)
            .bind(id)
            .bind(max_attempts)
            .bind(lock_seconds)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login failure")?;

        let locked_until: Option<DateTime<Utc>> = row.get("locked_until");
        Ok(FailedAttempt {
            login_attempts: row.get("login_attempts"),
            locked_until,
        })
    }

    async fn record_login_success(&self, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE admin_users
            SET login_attempts = 0,
                locked_until = NULL,
                last_login_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login success")?;
        Ok(())
    }

    async fn set_pending_mfa_secret(&self, id: Uuid, secret: &str) -> Result<()> {
        let query = "UPDATE admin_users SET mfa_pending_secret = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        sqlx::query(query)
            .bind(id)
            .bind(secret)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to stage pending MFA secret")?;
        Ok(())
    }

    async fn confirm_mfa(&self, id: Uuid) -> Result<bool> {
        // The pending secret is promoted and cleared in one statement, so a
        // concurrent confirm sees either the staged or the enabled state.
        let query = r"
            UPDATE admin_users
            SET mfa_secret = mfa_pending_secret,
                mfa_enabled = TRUE,
                mfa_pending_secret = NULL
            WHERE id = $1
              AND mfa_pending_secret IS NOT NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to confirm MFA secret")?;
        Ok(result.rows_affected() > 0)
    }

    async fn disable_mfa(&self, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE admin_users
            SET mfa_secret = NULL,
                mfa_pending_secret = NULL,
                mfa_enabled = FALSE
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to disable MFA")?;
        Ok(())
    }

    async fn role_permissions(&self, role_id: Uuid) -> Result<HashSet<String>> {
        let query = r"
            SELECT permission
            FROM role_permissions
            WHERE role_id = $1
              AND granted
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let rows = sqlx::query(query)
            .bind(role_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to resolve role permissions")?;
        Ok(rows.iter().map(|row| row.get("permission")).collect())
    }
}

/// Postgres [`AuditSink`].
#[derive(Clone, Debug)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn event_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditEvent> {
    let old_values: Option<String> = row.get("old_values");
    let new_values: Option<String> = row.get("new_values");
    Ok(AuditEvent {
        id: row.get("id"),
        actor_id: row.get("actor_id"),
        action: row.get("action"),
        resource_type: row.get("resource_type"),
        resource_id: row.get("resource_id"),
        old_values: old_values
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .context("invalid old_values json")?,
        new_values: new_values
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .context("invalid new_values json")?,
        ip: row.get("ip"),
        user_agent: row.get("user_agent"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent> {
        let old_values = event
            .old_values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to serialize old_values")?;
        let new_values = event
            .new_values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to serialize new_values")?;

        let query = r"
            INSERT INTO audit_logs
                (actor_id, action, resource_type, resource_id,
                 old_values, new_values, ip, user_agent)
            VALUES ($1, $2, $3, $4, $5::jsonb, $6::jsonb, $7::inet, $8)
            RETURNING id, created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        let row = sqlx::query(query)
            .bind(event.actor_id)
            .bind(&event.action)
            .bind(&event.resource_type)
            .bind(&event.resource_id)
            .bind(&old_values)
            .bind(&new_values)
            .bind(&event.ip)
            .bind(&event.user_agent)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to append audit event")?;

        Ok(AuditEvent {
            id: row.get("id"),
            actor_id: event.actor_id,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            old_values: event.old_values,
            new_values: event.new_values,
            ip: event.ip,
            user_agent: event.user_agent,
            created_at: row.get("created_at"),
        })
    }

    async fn list(&self, filter: &AuditQuery) -> Result<Vec<AuditEvent>> {
        // One static statement; absent filters collapse to TRUE.
        let query = r"
            SELECT id, actor_id, action, resource_type, resource_id,
                   old_values::text AS old_values, new_values::text AS new_values,
                   ip::text AS ip, user_agent, created_at
            FROM audit_logs
            WHERE ($1::text IS NULL OR action = $1)
              AND ($2::text IS NULL OR resource_type = $2)
              AND ($3::text IS NULL
                   OR action ILIKE '%' || $3 || '%'
                   OR resource_type ILIKE '%' || $3 || '%'
                   OR resource_id ILIKE '%' || $3 || '%')
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC
            LIMIT $6
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let rows = sqlx::query(query)
            .bind(&filter.action)
            .bind(&filter.resource_type)
            .bind(&filter.search)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT))
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list audit events")?;

        rows.iter().map(event_from_row).collect()
    }
}

//! Audit log query and export endpoints.
//!
//! Both routes are gated on `audit:read` (any-of; super admins bypass).
//! Export always answers with `text/csv` and the fixed header row, even for
//! zero matching events.

use axum::{
    Json,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use super::auth::{AuthState, RateLimitScope, require_permissions};
use crate::api::error::ApiError;
use crate::audit::{AuditEvent, AuditQuery, render_csv};

const AUDIT_READ: &str = "audit:read";

#[derive(Deserialize, IntoParams, Debug, Default)]
pub struct AuditLogsParams {
    /// Exact action match, e.g. `login`.
    pub action: Option<String>,
    /// Exact resource type match, e.g. `module`.
    pub resource_type: Option<String>,
    /// Substring search over action, resource type, and resource id.
    pub search: Option<String>,
    /// Inclusive lower bound (RFC3339).
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC3339).
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditLogsParams {
    fn into_query(self) -> AuditQuery {
        AuditQuery {
            action: self.action.filter(|value| !value.is_empty()),
            resource_type: self.resource_type.filter(|value| !value.is_empty()),
            search: self.search.filter(|value| !value.is_empty()),
            from: self.from,
            to: self.to,
            limit: self.limit,
        }
    }
}

#[utoipa::path(
    get,
    path = "/audit-logs",
    params(AuditLogsParams),
    responses(
        (status = 200, description = "Matching audit events, newest first.", body = [AuditEvent]),
        (status = 401, description = "Missing or invalid token."),
        (status = 403, description = "Insufficient permissions."),
    ),
    tag = "audit"
)]
pub async fn list(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    params: Query<AuditLogsParams>,
) -> Result<impl IntoResponse, ApiError> {
    state.enforce_rate_limit(&headers, RateLimitScope::General)?;
    require_permissions(&headers, &state, &[AUDIT_READ]).await?;

    let events = state
        .audit()
        .sink()
        .list(&params.0.into_query())
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(events))
}

#[utoipa::path(
    get,
    path = "/audit-logs/export",
    params(AuditLogsParams),
    responses(
        (status = 200, description = "CSV export with a fixed header row.", body = String, content_type = "text/csv"),
        (status = 401, description = "Missing or invalid token."),
        (status = 403, description = "Insufficient permissions."),
    ),
    tag = "audit"
)]
pub async fn export(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    params: Query<AuditLogsParams>,
) -> Result<impl IntoResponse, ApiError> {
    state.enforce_rate_limit(&headers, RateLimitScope::General)?;
    require_permissions(&headers, &state, &[AUDIT_READ]).await?;

    let events = state
        .audit()
        .sink()
        .list(&params.0.into_query())
        .await
        .map_err(ApiError::Internal)?;

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "text/csv")],
        render_csv(&events),
    ))
}

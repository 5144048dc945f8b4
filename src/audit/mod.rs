//! Append-only audit trail of administrative actions.
//!
//! Flow Overview:
//! 1) Handlers call [`AuditRecorder::record`] after the primary effect of an
//!    operation is durably applied.
//! 2) The append runs on a detached task, so a client disconnect never
//!    cancels it.
//! 3) Sink failures are logged and swallowed; the caller's response is never
//!    aborted by the audit trail. Completeness is best-effort by design.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::AuditSink;

/// One immutable audit event. Never mutated or deleted after creation.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Event fields supplied by the caller; `id` and `created_at` are stamped by
/// the sink.
#[derive(Clone, Debug, Default)]
pub struct NewAuditEvent {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAuditEvent {
    #[must_use]
    pub fn new(action: &str, resource_type: &str) -> Self {
        Self {
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    #[must_use]
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    #[must_use]
    pub fn old_values(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    #[must_use]
    pub fn new_values(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }

    #[must_use]
    pub fn client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }
}

/// Filters for audit queries. All fields are conjunctive.
#[derive(Clone, Debug, Default)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    /// Substring match over action, resource type, and resource id.
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Best-effort recorder over an [`AuditSink`].
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn AuditSink> {
        &self.sink
    }

    /// Append one event, detached from the caller's request lifecycle.
    ///
    /// The spawned task keeps running after the response is sent or the
    /// client disconnects. Failures are logged, never surfaced.
    pub fn record(&self, event: NewAuditEvent) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(err) = sink.append(event).await {
                error!("Failed to append audit event: {err}");
            }
        });
    }
}

/// CSV header for audit exports. Present even with zero rows.
pub const EXPORT_CSV_HEADER: &str = "id,user_id,action,resource_type,resource_id,created_at";

/// Render events as CSV with the fixed export header.
#[must_use]
pub fn render_csv(events: &[AuditEvent]) -> String {
    let mut out = String::from(EXPORT_CSV_HEADER);
    out.push('\n');
    for event in events {
        let row = [
            event.id.to_string(),
            event.actor_id.map(|id| id.to_string()).unwrap_or_default(),
            event.action.clone(),
            event.resource_type.clone(),
            event.resource_id.clone().unwrap_or_default(),
            event.created_at.to_rfc3339(),
        ];
        let escaped: Vec<String> = row.iter().map(|field| escape_csv(field)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditEvent, EXPORT_CSV_HEADER, NewAuditEvent, escape_csv, render_csv};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn render_csv_emits_header_with_zero_rows() {
        let csv = render_csv(&[]);
        assert_eq!(csv, format!("{EXPORT_CSV_HEADER}\n"));
    }

    #[test]
    fn render_csv_escapes_embedded_commas_and_quotes() {
        let event = AuditEvent {
            id: Uuid::nil(),
            actor_id: None,
            action: "module_toggle".to_string(),
            resource_type: "module,with \"name\"".to_string(),
            resource_id: Some("billing".to_string()),
            old_values: None,
            new_values: None,
            ip: None,
            user_agent: None,
            created_at: Utc::now(),
        };
        let csv = render_csv(&[event]);
        assert!(csv.contains("\"module,with \"\"name\"\"\""));
    }

    #[test]
    fn escape_csv_passes_plain_fields_through() {
        assert_eq!(escape_csv("login"), "login");
    }

    #[test]
    fn builder_fills_optional_fields() {
        let actor = Uuid::new_v4();
        let event = NewAuditEvent::new("login", "auth")
            .actor(actor)
            .resource_id("session")
            .client(Some("1.2.3.4".to_string()), None);
        assert_eq!(event.actor_id, Some(actor));
        assert_eq!(event.resource_id.as_deref(), Some("session"));
        assert_eq!(event.ip.as_deref(), Some("1.2.3.4"));
        assert!(event.user_agent.is_none());
    }
}

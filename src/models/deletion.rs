use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// ScheduledDeletion model - a durable "delete object X of model Y at time
/// T" record. Upserted by `(app_label, model_name, object_id)` so
/// re-scheduling is idempotent; cancellable until the task flips
/// `in_progress`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ScheduledDeletion {
    pub id: i64,
    pub guid: String,
    pub app_label: String,
    pub model_name: String,
    pub object_id: i64,
    pub date_added: DateTime<Utc>,
    pub date_scheduled: DateTime<Utc>,
    pub actor_id: Option<i64>,
    pub data: serde_json::Value,
    pub in_progress: bool,
}

/// Kinds of operations recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    IssueDelete,
    IssueDiscard,
    IssueMerge,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::IssueDelete => "issue.delete",
            AuditEvent::IssueDiscard => "issue.discard",
            AuditEvent::IssueMerge => "issue.merge",
        }
    }
}

/// AuditLogEntry model - one row per mutated group per operation
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub project_id: i32,
    pub actor_id: Option<i64>,
    pub event: String,
    pub target_object: i64,
    pub data: serde_json::Value,
    pub transaction_id: String,
    pub datetime: DateTime<Utc>,
}

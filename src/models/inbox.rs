use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Why a group landed in the triage inbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[repr(i32)]
pub enum GroupInboxReason {
    New = 0,
    Regression = 2,
    Manual = 3,
    Escalating = 5,
    Ongoing = 6,
}

/// Why a group was taken out of the inbox, recorded for logging only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupInboxRemoveAction {
    Resolved,
    Ignored,
    MarkReviewed,
}

impl GroupInboxRemoveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupInboxRemoveAction::Resolved => "resolved",
            GroupInboxRemoveAction::Ignored => "ignored",
            GroupInboxRemoveAction::MarkReviewed => "mark_reviewed",
        }
    }
}

/// GroupInbox model - per-project worklist of groups needing triage,
/// at most one row per group
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GroupInbox {
    pub id: i64,
    pub project_id: i32,
    pub group_id: i64,
    pub reason: GroupInboxReason,
    pub date_added: DateTime<Utc>,
}

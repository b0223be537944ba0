use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Kind of activity recorded against a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[repr(i32)]
pub enum ActivityType {
    SetResolved = 1,
    SetUnresolved = 2,
    SetIgnored = 3,
    SetRegression = 6,
    Merge = 11,
    SetEscalating = 31,
    AutoSetOngoing = 37,
}

/// Activity model - one audit row per group mutation
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Activity {
    pub id: i64,
    pub group_id: i64,
    pub project_id: i32,
    pub activity_type: ActivityType,
    pub data: serde_json::Value,
    pub datetime: DateTime<Utc>,
}

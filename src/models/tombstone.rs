use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// GroupTombstone model - a permanent marker written when a group is
/// discarded for good. Any future event hashing to a tombstoned hash is
/// dropped rather than resurrecting the group's identity.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GroupTombstone {
    pub id: i64,
    /// The deleted group, unique so a group is only ever tombstoned once
    pub previous_group_id: i64,
    pub project_id: i32,
    pub level: i32,
    pub message: String,
    pub culprit: Option<String>,
    pub data: serde_json::Value,
    pub actor_id: Option<i64>,
    pub times_seen: i32,
    pub last_seen: Option<DateTime<Utc>>,
    pub date_added: DateTime<Utc>,
}

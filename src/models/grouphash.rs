use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// GroupHash model - maps a content hash to the group that owns it.
///
/// Unique per `(project_id, hash)`. At most one of `group_id` /
/// `group_tombstone_id` is meaningfully set at a time: a tombstoned hash
/// must never own a live group.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GroupHash {
    pub id: i64,
    pub project_id: i32,
    pub hash: String,
    pub group_id: Option<i64>,
    pub group_tombstone_id: Option<i64>,
}

/// Provenance metadata captured best-effort when a grouphash is created
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GroupHashMetadata {
    pub id: i64,
    pub grouphash_id: i64,
    /// Grouping config that first produced this hash
    pub grouping_config: String,
    /// Serialized digest of the contributing variants
    pub hashing_metadata: serde_json::Value,
    /// Grouphash this one was matched to by the similarity service, if any
    pub seer_matched_grouphash_id: Option<i64>,
    pub date_added: DateTime<Utc>,
}

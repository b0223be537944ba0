use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Lifecycle status of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[repr(i32)]
pub enum GroupStatus {
    Unresolved = 0,
    Resolved = 1,
    Ignored = 2,
    PendingDeletion = 3,
    DeletionInProgress = 4,
    PendingMerge = 5,
}

impl TryFrom<i32> for GroupStatus {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(GroupStatus::Unresolved),
            1 => Ok(GroupStatus::Resolved),
            2 => Ok(GroupStatus::Ignored),
            3 => Ok(GroupStatus::PendingDeletion),
            4 => Ok(GroupStatus::DeletionInProgress),
            5 => Ok(GroupStatus::PendingMerge),
            other => Err(other),
        }
    }
}

/// Finer-grained state, only meaningful for unresolved and ignored groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[repr(i32)]
pub enum GroupSubStatus {
    UntilEscalating = 1,
    UntilConditionMet = 2,
    Forever = 3,
    Escalating = 4,
    Ongoing = 5,
    Regressed = 6,
    New = 7,
}

/// Substatuses valid for ignored groups
pub const IGNORED_SUBSTATUS_CHOICES: &[GroupSubStatus] = &[
    GroupSubStatus::UntilEscalating,
    GroupSubStatus::UntilConditionMet,
    GroupSubStatus::Forever,
];

impl TryFrom<i32> for GroupSubStatus {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            1 => Ok(GroupSubStatus::UntilEscalating),
            2 => Ok(GroupSubStatus::UntilConditionMet),
            3 => Ok(GroupSubStatus::Forever),
            4 => Ok(GroupSubStatus::Escalating),
            5 => Ok(GroupSubStatus::Ongoing),
            6 => Ok(GroupSubStatus::Regressed),
            7 => Ok(GroupSubStatus::New),
            other => Err(other),
        }
    }
}

/// Broad category of the issue a group represents. Merging is only valid
/// for error groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[repr(i32)]
pub enum IssueCategory {
    Error = 1,
    Performance = 2,
    Cron = 3,
    Feedback = 4,
}

/// Triage priority, recalculated when a group escalates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[repr(i32)]
pub enum GroupPriority {
    Low = 25,
    Medium = 50,
    High = 75,
}

/// Group model - the issue aggregate that events are deduplicated into
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Group {
    pub id: i64,
    pub project_id: i32,
    pub status: GroupStatus,
    pub substatus: Option<GroupSubStatus>,
    pub priority: GroupPriority,
    pub issue_category: IssueCategory,
    pub level: i32,
    pub message: String,
    pub culprit: Option<String>,
    pub data: serde_json::Value,
    pub times_seen: i32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Group {
    /// Substatus is set if-and-only-if the group is unresolved or ignored.
    pub fn has_valid_substatus(&self) -> bool {
        let requires_substatus = matches!(
            self.status,
            GroupStatus::Unresolved | GroupStatus::Ignored
        );
        requires_substatus == self.substatus.is_some()
    }
}

pub mod activity;
pub mod deletion;
pub mod event;
pub mod group;
pub mod grouphash;
pub mod inbox;
pub mod tombstone;

pub use activity::{Activity, ActivityType};
pub use deletion::{AuditEvent, AuditLogEntry, ScheduledDeletion};
pub use event::{Event, DEFAULT_FINGERPRINT};
pub use group::{
    Group, GroupPriority, GroupStatus, GroupSubStatus, IssueCategory, IGNORED_SUBSTATUS_CHOICES,
};
pub use grouphash::{GroupHash, GroupHashMetadata};
pub use inbox::{GroupInbox, GroupInboxReason, GroupInboxRemoveAction};
pub use tombstone::GroupTombstone;

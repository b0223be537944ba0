pub mod activity;
pub mod deletion;
pub mod group;
pub mod grouphash;
pub mod inbox;
pub mod lifecycle;
pub mod merge;
pub mod resolver;

pub use activity::ActivityService;
pub use deletion::{DeleteType, DeletionService, ScheduledDeletionService};
pub use group::GroupService;
pub use grouphash::GroupHashService;
pub use inbox::InboxService;
pub use lifecycle::{
    init_status_change_handlers, LifecycleService, StatusChangeData, StatusChangeMessage,
};
pub use merge::{MergeResult, MergeService};
pub use resolver::GroupResolver;

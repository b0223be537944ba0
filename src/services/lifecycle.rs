//! Group lifecycle state machine: validated status/substatus transitions,
//! each driving inbox and activity side effects plus a fan-out to
//! registered observers.

use std::sync::{Arc, OnceLock};

use serde::Deserialize;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{
    Activity, ActivityType, Group, GroupInboxReason, GroupInboxRemoveAction, GroupPriority,
    GroupStatus, GroupSubStatus, IGNORED_SUBSTATUS_CHOICES,
};
use crate::services::activity::ActivityService;
use crate::services::group::GroupService;
use crate::services::inbox::InboxService;
use crate::services::resolver::GroupResolver;
use crate::tasks::{Task, TaskDispatcher};

/// Raw status-change message as consumed from the transport
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChangeMessage {
    pub fingerprint: Vec<String>,
    pub project_id: i32,
    pub new_status: i32,
    pub new_substatus: Option<i32>,
    pub detector_id: Option<i64>,
    pub activity_data: Option<serde_json::Value>,
}

/// Typed status-change payload after enum validation
#[derive(Debug, Clone)]
pub struct StatusChangeData {
    pub fingerprint: Vec<String>,
    pub project_id: i32,
    pub new_status: GroupStatus,
    pub new_substatus: Option<GroupSubStatus>,
    pub detector_id: Option<i64>,
    pub activity_data: Option<serde_json::Value>,
}

impl TryFrom<StatusChangeMessage> for StatusChangeData {
    type Error = AppError;

    fn try_from(message: StatusChangeMessage) -> AppResult<Self> {
        let new_status = GroupStatus::try_from(message.new_status)
            .map_err(|raw| AppError::Validation(format!("Unknown status: {}", raw)))?;
        let new_substatus = message
            .new_substatus
            .map(GroupSubStatus::try_from)
            .transpose()
            .map_err(|raw| AppError::Validation(format!("Unknown substatus: {}", raw)))?;

        Ok(Self {
            fingerprint: message.fingerprint,
            project_id: message.project_id,
            new_status,
            new_substatus,
            detector_id: message.detector_id,
            activity_data: message.activity_data,
        })
    }
}

/// Substatus is only allowed - and then required - for unresolved and
/// ignored groups.
pub fn validate_status_change(
    new_status: GroupStatus,
    new_substatus: Option<GroupSubStatus>,
) -> AppResult<()> {
    let requires_substatus = matches!(new_status, GroupStatus::Unresolved | GroupStatus::Ignored);

    if requires_substatus && new_substatus.is_none() {
        return Err(AppError::Validation(format!(
            "Missing substatus for status {:?}",
            new_status
        )));
    }
    if !requires_substatus && new_substatus.is_some() {
        return Err(AppError::Validation(format!(
            "Unexpected substatus for status {:?}",
            new_status
        )));
    }
    Ok(())
}

/// Observer invoked after a transition created an activity row
pub type GroupUpdateHandler = Arc<dyn Fn(&Group, &StatusChangeData, &Activity) + Send + Sync>;

static STATUS_CHANGE_HANDLERS: OnceLock<Vec<GroupUpdateHandler>> = OnceLock::new();

/// Installs the status-change observers. Called once at startup; later
/// calls are ignored and return false.
pub fn init_status_change_handlers(handlers: Vec<GroupUpdateHandler>) -> bool {
    STATUS_CHANGE_HANDLERS.set(handlers).is_ok()
}

fn registered_handlers() -> &'static [GroupUpdateHandler] {
    STATUS_CHANGE_HANDLERS.get().map(Vec::as_slice).unwrap_or(&[])
}

pub struct LifecycleService;

impl LifecycleService {
    /// Applies a validated status change to a group.
    ///
    /// A request for the exact current state is a no-op. Invalid pairings
    /// are rejected before any write. Unmodeled combinations are a hard
    /// `UnsupportedTransition` failure.
    pub async fn update_status(
        pool: &PgPool,
        dispatcher: &dyn TaskDispatcher,
        group: &Group,
        status_change: &StatusChangeData,
    ) -> AppResult<()> {
        let new_status = status_change.new_status;
        let new_substatus = status_change.new_substatus;

        if group.status == new_status && group.substatus == new_substatus {
            return Ok(());
        }

        validate_status_change(new_status, new_substatus)?;

        let activity_type = match new_status {
            GroupStatus::Resolved => {
                GroupService::update_group_status(
                    pool,
                    group,
                    new_status,
                    new_substatus,
                    ActivityType::SetResolved,
                    status_change.activity_data.as_ref(),
                )
                .await?;
                InboxService::remove_group_from_inbox(
                    pool,
                    group,
                    GroupInboxRemoveAction::Resolved,
                )
                .await?;
                Self::kick_off_status_sync(dispatcher, group).await;
                Some(ActivityType::SetResolved)
            }

            GroupStatus::Ignored => {
                // UNTIL_ESCALATING and UNTIL_CONDITION_MET expect the
                // caller to monitor the condition and send a new status
                // change when it flips
                let Some(substatus) = new_substatus else {
                    return Err(AppError::Validation(
                        "Missing substatus for ignored group".to_string(),
                    ));
                };
                if !IGNORED_SUBSTATUS_CHOICES.contains(&substatus) {
                    return Err(AppError::Validation(format!(
                        "Invalid substatus for ignored group: {:?}",
                        substatus
                    )));
                }
                GroupService::update_group_status(
                    pool,
                    group,
                    new_status,
                    new_substatus,
                    ActivityType::SetIgnored,
                    status_change.activity_data.as_ref(),
                )
                .await?;
                InboxService::remove_group_from_inbox(
                    pool,
                    group,
                    GroupInboxRemoveAction::Ignored,
                )
                .await?;
                Self::kick_off_status_sync(dispatcher, group).await;
                Some(ActivityType::SetIgnored)
            }

            GroupStatus::Unresolved => match new_substatus.ok_or_else(|| {
                AppError::Validation("Missing substatus for unresolved group".to_string())
            })? {
                GroupSubStatus::Escalating => {
                    Self::manage_issue_states(pool, dispatcher, group).await?;
                    // Activity and inbox handling is delegated; no fan-out
                    None
                }
                GroupSubStatus::Regressed => {
                    GroupService::update_group_status(
                        pool,
                        group,
                        new_status,
                        new_substatus,
                        ActivityType::SetRegression,
                        status_change.activity_data.as_ref(),
                    )
                    .await?;
                    InboxService::add_group_to_inbox(pool, group, GroupInboxReason::Regression)
                        .await?;
                    Self::kick_off_status_sync(dispatcher, group).await;
                    Some(ActivityType::SetRegression)
                }
                GroupSubStatus::Ongoing => {
                    // A previously escalating group settles back via
                    // AUTO_SET_ONGOING; anything else is a plain unresolve
                    let activity_type = if group.substatus == Some(GroupSubStatus::Escalating) {
                        ActivityType::AutoSetOngoing
                    } else {
                        ActivityType::SetUnresolved
                    };
                    GroupService::update_group_status(
                        pool,
                        group,
                        new_status,
                        new_substatus,
                        activity_type,
                        status_change.activity_data.as_ref(),
                    )
                    .await?;
                    InboxService::add_group_to_inbox(pool, group, GroupInboxReason::Ongoing)
                        .await?;
                    Self::kick_off_status_sync(dispatcher, group).await;
                    Some(activity_type)
                }
                GroupSubStatus::New => {
                    // NEW is set on creation only, never via this path
                    return Err(AppError::Validation(
                        "Cannot set substatus NEW via status change".to_string(),
                    ));
                }
                other => {
                    return Err(AppError::Validation(format!(
                        "Invalid substatus for unresolved group: {:?}",
                        other
                    )));
                }
            },

            other => {
                return Err(AppError::UnsupportedTransition(format!(
                    "{:?} / {:?}",
                    other, new_substatus
                )));
            }
        };

        if let Some(activity_type) = activity_type {
            Self::notify_handlers(pool, group, status_change, activity_type).await?;
        }

        Ok(())
    }

    /// Escalation path: recalculate priority and put the group back in the
    /// inbox with reason ESCALATING.
    async fn manage_issue_states(
        pool: &PgPool,
        dispatcher: &dyn TaskDispatcher,
        group: &Group,
    ) -> AppResult<()> {
        GroupService::update_group_status(
            pool,
            group,
            GroupStatus::Unresolved,
            Some(GroupSubStatus::Escalating),
            ActivityType::SetEscalating,
            None,
        )
        .await?;
        GroupService::set_priority(pool, group.id, GroupPriority::High).await?;
        InboxService::add_group_to_inbox(pool, group, GroupInboxReason::Escalating).await?;
        Self::kick_off_status_sync(dispatcher, group).await;
        Ok(())
    }

    /// Notifies every registered handler with the most recent matching
    /// activity. Invocation order is unspecified and handler panics are
    /// the caller's problem - this is a hook point, not an isolation
    /// boundary.
    async fn notify_handlers(
        pool: &PgPool,
        group: &Group,
        status_change: &StatusChangeData,
        activity_type: ActivityType,
    ) -> AppResult<()> {
        let handlers = registered_handlers();
        if handlers.is_empty() {
            return Ok(());
        }

        let Some(latest_activity) =
            ActivityService::latest_for_group(pool, group.id, activity_type).await?
        else {
            return Ok(());
        };

        metrics::counter!("lifecycle.status_change_handler")
            .increment(handlers.len() as u64);

        for handler in handlers {
            handler(group, status_change, &latest_activity);
        }

        Ok(())
    }

    async fn kick_off_status_sync(dispatcher: &dyn TaskDispatcher, group: &Group) {
        dispatcher
            .dispatch(Task::StatusSync {
                project_id: group.project_id,
                group_id: group.id,
            })
            .await;
    }

    /// Consumes one status-change message: resolves the fingerprint to a
    /// group and applies the transition. A missing group is a dropped
    /// message (metered), not an error.
    pub async fn process_status_change_message(
        pool: &PgPool,
        dispatcher: &dyn TaskDispatcher,
        message: StatusChangeMessage,
    ) -> AppResult<Option<Group>> {
        let status_change = StatusChangeData::try_from(message)?;

        metrics::counter!("lifecycle.status_change.messages").increment(1);

        let group = GroupResolver::get_group_from_fingerprint(
            pool,
            status_change.project_id,
            &status_change.fingerprint,
        )
        .await?;

        let Some(group) = group else {
            log::info!(
                "Status change dropped, group not found (project: {}, fingerprint: {:?})",
                status_change.project_id,
                status_change.fingerprint
            );
            metrics::counter!("lifecycle.status_change.dropped_group_not_found").increment(1);
            return Ok(None);
        };

        Self::update_status(pool, dispatcher, &group, &status_change).await?;

        Ok(Some(group))
    }
}

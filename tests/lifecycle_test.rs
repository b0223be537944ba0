//! Integration tests for the group lifecycle state machine
//!
//! Exercises the status-change transition table against a real database:
//! inbox/activity side effects, idempotence, and rejection cases.

mod common;

use common::{create_group, create_group_in_state, TestDb};
use grouptrak::error::AppError;
use grouptrak::models::{
    ActivityType, GroupInboxReason, GroupPriority, GroupStatus, GroupSubStatus,
};
use grouptrak::services::{
    ActivityService, GroupService, InboxService, LifecycleService, StatusChangeData,
    StatusChangeMessage,
};
use grouptrak::services::lifecycle::validate_status_change;
use grouptrak::tasks::{RecordingDispatcher, Task};
use rstest::rstest;

#[rstest]
#[case(GroupStatus::Resolved, None, true)]
#[case(GroupStatus::Resolved, Some(GroupSubStatus::Ongoing), false)]
#[case(GroupStatus::Ignored, Some(GroupSubStatus::Forever), true)]
#[case(GroupStatus::Ignored, None, false)]
#[case(GroupStatus::Unresolved, Some(GroupSubStatus::Regressed), true)]
#[case(GroupStatus::Unresolved, None, false)]
#[case(GroupStatus::PendingDeletion, None, true)]
#[case(GroupStatus::PendingDeletion, Some(GroupSubStatus::Ongoing), false)]
fn substatus_pairing_rules(
    #[case] status: GroupStatus,
    #[case] substatus: Option<GroupSubStatus>,
    #[case] valid: bool,
) {
    assert_eq!(validate_status_change(status, substatus).is_ok(), valid);
}

fn status_change(
    project_id: i32,
    new_status: GroupStatus,
    new_substatus: Option<GroupSubStatus>,
) -> StatusChangeData {
    StatusChangeData {
        fingerprint: vec!["irrelevant".to_string()],
        project_id,
        new_status,
        new_substatus,
        detector_id: None,
        activity_data: None,
    }
}

#[tokio::test]
async fn resolve_removes_from_inbox_and_records_activity() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;
    InboxService::add_group_to_inbox(&db.pool, &group, GroupInboxReason::New)
        .await
        .unwrap();

    let dispatcher = RecordingDispatcher::new();
    LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Resolved, None),
    )
    .await
    .unwrap();

    let updated = GroupService::get_by_id(&db.pool, group.id).await.unwrap();
    assert_eq!(updated.status, GroupStatus::Resolved);
    assert_eq!(updated.substatus, None);

    let activity =
        ActivityService::latest_for_group(&db.pool, group.id, ActivityType::SetResolved)
            .await
            .unwrap();
    assert!(activity.is_some());

    let inbox = InboxService::get_for_group(&db.pool, group.id).await.unwrap();
    assert!(inbox.is_none());

    assert!(dispatcher.recorded().iter().any(|task| matches!(
        task,
        Task::StatusSync { group_id, .. } if *group_id == group.id
    )));
}

#[tokio::test]
async fn ignore_requires_a_valid_ignored_substatus() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;
    let dispatcher = RecordingDispatcher::new();

    let err = LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Ignored, Some(GroupSubStatus::Escalating)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Ignored, Some(GroupSubStatus::UntilEscalating)),
    )
    .await
    .unwrap();

    let updated = GroupService::get_by_id(&db.pool, group.id).await.unwrap();
    assert_eq!(updated.status, GroupStatus::Ignored);
    assert_eq!(updated.substatus, Some(GroupSubStatus::UntilEscalating));
    assert!(
        ActivityService::latest_for_group(&db.pool, group.id, ActivityType::SetIgnored)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn escalating_raises_priority_and_inboxes_with_escalating_reason() {
    let db = TestDb::new().await;
    let group = create_group_in_state(
        &db.pool,
        1,
        GroupStatus::Ignored,
        Some(GroupSubStatus::UntilEscalating),
    )
    .await;
    let dispatcher = RecordingDispatcher::new();

    LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Unresolved, Some(GroupSubStatus::Escalating)),
    )
    .await
    .unwrap();

    let updated = GroupService::get_by_id(&db.pool, group.id).await.unwrap();
    assert_eq!(updated.status, GroupStatus::Unresolved);
    assert_eq!(updated.substatus, Some(GroupSubStatus::Escalating));
    assert_eq!(updated.priority, GroupPriority::High);

    let inbox = InboxService::get_for_group(&db.pool, group.id)
        .await
        .unwrap()
        .expect("escalated group should be in the inbox");
    assert_eq!(inbox.reason, GroupInboxReason::Escalating);

    assert!(
        ActivityService::latest_for_group(&db.pool, group.id, ActivityType::SetEscalating)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn ongoing_after_escalating_is_auto_set_ongoing() {
    let db = TestDb::new().await;
    let group = create_group_in_state(
        &db.pool,
        1,
        GroupStatus::Unresolved,
        Some(GroupSubStatus::Escalating),
    )
    .await;
    let dispatcher = RecordingDispatcher::new();

    LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Unresolved, Some(GroupSubStatus::Ongoing)),
    )
    .await
    .unwrap();

    assert!(
        ActivityService::latest_for_group(&db.pool, group.id, ActivityType::AutoSetOngoing)
            .await
            .unwrap()
            .is_some()
    );

    let inbox = InboxService::get_for_group(&db.pool, group.id)
        .await
        .unwrap()
        .expect("ongoing group should be in the inbox");
    assert_eq!(inbox.reason, GroupInboxReason::Ongoing);
}

#[tokio::test]
async fn ongoing_from_resolved_is_plain_unresolve() {
    let db = TestDb::new().await;
    let group = create_group_in_state(&db.pool, 1, GroupStatus::Resolved, None).await;
    let dispatcher = RecordingDispatcher::new();

    LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Unresolved, Some(GroupSubStatus::Ongoing)),
    )
    .await
    .unwrap();

    assert!(
        ActivityService::latest_for_group(&db.pool, group.id, ActivityType::SetUnresolved)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        ActivityService::latest_for_group(&db.pool, group.id, ActivityType::AutoSetOngoing)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn regression_adds_inbox_row_with_regression_reason() {
    let db = TestDb::new().await;
    let group = create_group_in_state(&db.pool, 1, GroupStatus::Resolved, None).await;
    let dispatcher = RecordingDispatcher::new();

    LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Unresolved, Some(GroupSubStatus::Regressed)),
    )
    .await
    .unwrap();

    let inbox = InboxService::get_for_group(&db.pool, group.id)
        .await
        .unwrap()
        .expect("regressed group should be in the inbox");
    assert_eq!(inbox.reason, GroupInboxReason::Regression);
    assert!(
        ActivityService::latest_for_group(&db.pool, group.id, ActivityType::SetRegression)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn identical_state_is_a_noop() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;
    let dispatcher = RecordingDispatcher::new();

    // Group is created UNRESOLVED/NEW; requesting that exact state again
    // must not write activities or touch the inbox
    LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Unresolved, Some(GroupSubStatus::New)),
    )
    .await
    .unwrap();

    assert_eq!(
        ActivityService::count_for_group(&db.pool, group.id, ActivityType::SetUnresolved)
            .await
            .unwrap(),
        0
    );
    assert!(dispatcher.recorded().is_empty());
}

#[tokio::test]
async fn new_substatus_cannot_be_set_after_creation() {
    let db = TestDb::new().await;
    let group = create_group_in_state(&db.pool, 1, GroupStatus::Resolved, None).await;
    let dispatcher = RecordingDispatcher::new();

    let err = LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Unresolved, Some(GroupSubStatus::New)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn substatus_and_status_must_pair_correctly() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;
    let dispatcher = RecordingDispatcher::new();

    // Resolved never carries a substatus
    let err = LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Resolved, Some(GroupSubStatus::Ongoing)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Unresolved always requires one
    let err = LifecycleService::update_status(
        &db.pool,
        &dispatcher,
        &group,
        &status_change(1, GroupStatus::Unresolved, None),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn bookkeeping_statuses_are_unsupported_transitions() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;
    let dispatcher = RecordingDispatcher::new();

    for status in [
        GroupStatus::PendingDeletion,
        GroupStatus::DeletionInProgress,
        GroupStatus::PendingMerge,
    ] {
        let err = LifecycleService::update_status(
            &db.pool,
            &dispatcher,
            &group,
            &status_change(1, status, None),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, AppError::UnsupportedTransition(_)),
            "expected unsupported transition for {:?}",
            status
        );
    }
}

#[tokio::test]
async fn status_change_message_resolves_group_via_fingerprint() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;

    sqlx::query("INSERT INTO grouphashes (project_id, hash, group_id) VALUES (1, 'aaaa', $1)")
        .bind(group.id)
        .execute(&db.pool)
        .await
        .unwrap();

    let dispatcher = RecordingDispatcher::new();
    let resolved = LifecycleService::process_status_change_message(
        &db.pool,
        &dispatcher,
        StatusChangeMessage {
            fingerprint: vec!["aaaa".to_string()],
            project_id: 1,
            new_status: GroupStatus::Resolved as i32,
            new_substatus: None,
            detector_id: None,
            activity_data: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(resolved.map(|g| g.id), Some(group.id));
    let updated = GroupService::get_by_id(&db.pool, group.id).await.unwrap();
    assert_eq!(updated.status, GroupStatus::Resolved);
}

#[tokio::test]
async fn status_change_message_for_unknown_fingerprint_is_dropped() {
    let db = TestDb::new().await;
    let dispatcher = RecordingDispatcher::new();

    let resolved = LifecycleService::process_status_change_message(
        &db.pool,
        &dispatcher,
        StatusChangeMessage {
            fingerprint: vec!["ffff".to_string()],
            project_id: 1,
            new_status: GroupStatus::Resolved as i32,
            new_substatus: None,
            detector_id: None,
            activity_data: None,
        },
    )
    .await
    .unwrap();

    assert!(resolved.is_none());
}

#[tokio::test]
async fn status_change_message_with_unknown_enum_value_is_rejected() {
    let db = TestDb::new().await;
    let dispatcher = RecordingDispatcher::new();

    let err = LifecycleService::process_status_change_message(
        &db.pool,
        &dispatcher,
        StatusChangeMessage {
            fingerprint: vec!["aaaa".to_string()],
            project_id: 1,
            new_status: 99,
            new_substatus: None,
            detector_id: None,
            activity_data: None,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
}

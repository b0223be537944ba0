//! Integration tests for group deletion, discard, merge and scheduled
//! deletion semantics.

mod common;

use common::{create_group, create_group_in_state, TestDb};
use grouptrak::config::DeletionSettings;
use grouptrak::error::AppError;
use grouptrak::models::{GroupInboxReason, GroupStatus, GroupSubStatus, IssueCategory};
use grouptrak::services::{
    DeleteType, DeletionService, GroupHashService, GroupService, InboxService, MergeService,
    ScheduledDeletionService,
};
use grouptrak::tasks::{RecordingDispatcher, Task};

fn settings() -> DeletionSettings {
    DeletionSettings {
        group_chunk_size: 100,
        schedule_days: 30,
    }
}

async fn link_hash(db: &TestDb, project_id: i32, hash: &str, group_id: i64) -> i64 {
    let (grouphash, _) = GroupHashService::get_or_create(&db.pool, project_id, hash)
        .await
        .unwrap();
    GroupHashService::claim_for_group(&db.pool, &[grouphash.id], group_id)
        .await
        .unwrap();
    grouphash.id
}

#[tokio::test]
async fn delete_marks_groups_and_severs_hash_and_inbox_links() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;
    link_hash(&db, 1, "gone", group.id).await;
    InboxService::add_group_to_inbox(&db.pool, &group, GroupInboxReason::New)
        .await
        .unwrap();

    let dispatcher = RecordingDispatcher::new();
    DeletionService::delete_group_list(
        &db.pool,
        &dispatcher,
        &settings(),
        Some(7),
        1,
        vec![group.clone()],
        DeleteType::Delete,
    )
    .await
    .unwrap();

    let marked = GroupService::get_by_id(&db.pool, group.id).await.unwrap();
    assert_eq!(marked.status, GroupStatus::PendingDeletion);
    assert_eq!(marked.substatus, None);

    // Hash and inbox rows are gone so nothing new can attach
    assert!(GroupHashService::get_for_group(&db.pool, group.id)
        .await
        .unwrap()
        .is_empty());
    assert!(InboxService::get_for_group(&db.pool, group.id)
        .await
        .unwrap()
        .is_none());

    // Audit row was written before the destructive steps
    let audit: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM audit_log WHERE target_object = $1 AND event = 'issue.delete'",
    )
    .bind(group.id)
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(audit.0, 1);
}

#[tokio::test]
async fn delete_rejects_groups_from_multiple_projects() {
    let db = TestDb::new().await;
    let group_a = create_group(&db.pool, 1).await;
    let group_b = create_group(&db.pool, 2).await;

    let dispatcher = RecordingDispatcher::new();
    let err = DeletionService::delete_group_list(
        &db.pool,
        &dispatcher,
        &settings(),
        None,
        1,
        vec![group_a.clone(), group_b],
        DeleteType::Delete,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    // Guard fires before any write
    let untouched = GroupService::get_by_id(&db.pool, group_a.id).await.unwrap();
    assert_eq!(untouched.status, GroupStatus::Unresolved);
    assert!(dispatcher.recorded().is_empty());
}

#[tokio::test]
async fn delete_chunks_tasks_under_one_transaction_id() {
    let db = TestDb::new().await;
    let mut groups = Vec::new();
    for _ in 0..5 {
        groups.push(create_group(&db.pool, 1).await);
    }
    let all_ids: Vec<i64> = groups.iter().map(|g| g.id).collect();

    let dispatcher = RecordingDispatcher::new();
    DeletionService::delete_group_list(
        &db.pool,
        &dispatcher,
        &DeletionSettings {
            group_chunk_size: 2,
            schedule_days: 30,
        },
        None,
        1,
        groups,
        DeleteType::Delete,
    )
    .await
    .unwrap();

    let mut chunked_ids = Vec::new();
    let mut transaction_ids = Vec::new();
    for task in dispatcher.recorded() {
        if let Task::DeleteGroups {
            object_ids,
            transaction_id,
            ..
        } = task
        {
            chunked_ids.extend(object_ids);
            transaction_ids.push(transaction_id);
        }
    }

    assert_eq!(transaction_ids.len(), 3, "5 groups in chunks of 2");
    transaction_ids.dedup();
    assert_eq!(transaction_ids.len(), 1, "all chunks share one transaction");

    chunked_ids.sort_unstable();
    let mut expected = all_ids.clone();
    expected.sort_unstable();
    assert_eq!(chunked_ids, expected, "chunks cover every group exactly once");
}

#[tokio::test]
async fn delete_skips_seer_task_for_non_error_groups() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;
    sqlx::query("UPDATE groups SET issue_category = $2 WHERE id = $1")
        .bind(group.id)
        .bind(IssueCategory::Cron)
        .execute(&db.pool)
        .await
        .unwrap();
    let group = GroupService::get_by_id(&db.pool, group.id).await.unwrap();

    let dispatcher = RecordingDispatcher::new();
    DeletionService::delete_group_list(
        &db.pool,
        &dispatcher,
        &settings(),
        None,
        1,
        vec![group],
        DeleteType::Delete,
    )
    .await
    .unwrap();

    assert!(!dispatcher
        .recorded()
        .iter()
        .any(|task| matches!(task, Task::SeerDeleteHashes { .. })));
}

#[tokio::test]
async fn groups_already_in_deletion_are_not_remarked() {
    let db = TestDb::new().await;
    let group =
        create_group_in_state(&db.pool, 1, GroupStatus::DeletionInProgress, None).await;

    let dispatcher = RecordingDispatcher::new();
    DeletionService::delete_group_list(
        &db.pool,
        &dispatcher,
        &settings(),
        None,
        1,
        vec![group.clone()],
        DeleteType::Delete,
    )
    .await
    .unwrap();

    let unchanged = GroupService::get_by_id(&db.pool, group.id).await.unwrap();
    assert_eq!(unchanged.status, GroupStatus::DeletionInProgress);
}

#[tokio::test]
async fn discard_tombstones_hashes_instead_of_deleting_them() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;
    let grouphash_id = link_hash(&db, 1, "retired", group.id).await;

    let dispatcher = RecordingDispatcher::new();
    DeletionService::delete_group_list(
        &db.pool,
        &dispatcher,
        &settings(),
        Some(7),
        1,
        vec![group.clone()],
        DeleteType::Discard,
    )
    .await
    .unwrap();

    // The hash survives, detached from the group and pointing at the
    // tombstone
    let (tombstone_id, hash_group_id): (Option<i64>, Option<i64>) = sqlx::query_as(
        "SELECT group_tombstone_id, group_id FROM grouphashes WHERE id = $1",
    )
    .bind(grouphash_id)
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert!(hash_group_id.is_none());
    let tombstone_id = tombstone_id.expect("hash must point at a tombstone");

    let (previous_group_id,): (i64,) =
        sqlx::query_as("SELECT previous_group_id FROM group_tombstones WHERE id = $1")
            .bind(tombstone_id)
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(previous_group_id, group.id);

    let audit: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM audit_log WHERE target_object = $1 AND event = 'issue.discard'",
    )
    .bind(group.id)
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(audit.0, 1);
}

#[tokio::test]
async fn deletion_task_removes_groups_and_nulls_seer_references() {
    let db = TestDb::new().await;
    let doomed = create_group(&db.pool, 1).await;
    let survivor = create_group(&db.pool, 1).await;

    let doomed_hash = link_hash(&db, 1, "d1", doomed.id).await;
    let survivor_hash = link_hash(&db, 1, "s1", survivor.id).await;

    // The survivor's metadata references the doomed hash via seer matching
    sqlx::query(
        "INSERT INTO grouphash_metadata (grouphash_id, grouping_config, seer_matched_grouphash_id) VALUES ($1, 'newstyle:2023-01-11', $2)",
    )
    .bind(survivor_hash)
    .bind(doomed_hash)
    .execute(&db.pool)
    .await
    .unwrap();

    DeletionService::delete_groups_for_project(&db.pool, 1, &[doomed.id], "txid")
        .await
        .unwrap();

    let err = GroupService::get_by_id(&db.pool, doomed.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let (seer_ref,): (Option<i64>,) = sqlx::query_as(
        "SELECT seer_matched_grouphash_id FROM grouphash_metadata WHERE grouphash_id = $1",
    )
    .bind(survivor_hash)
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert!(seer_ref.is_none(), "dangling seer reference must be nulled");

    // The survivor itself is untouched
    assert!(GroupService::get_by_id(&db.pool, survivor.id).await.is_ok());

    // Re-running the task for the same ids is a no-op
    DeletionService::delete_groups_for_project(&db.pool, 1, &[doomed.id], "txid")
        .await
        .unwrap();
}

#[tokio::test]
async fn merge_rejects_non_error_groups_before_mutating() {
    let db = TestDb::new().await;
    let group_a = create_group(&db.pool, 1).await;
    let group_b = create_group(&db.pool, 1).await;
    sqlx::query("UPDATE groups SET issue_category = $2 WHERE id = $1")
        .bind(group_b.id)
        .bind(IssueCategory::Performance)
        .execute(&db.pool)
        .await
        .unwrap();
    let group_b = GroupService::get_by_id(&db.pool, group_b.id).await.unwrap();

    let dispatcher = RecordingDispatcher::new();
    let err = MergeService::handle_merge(
        &db.pool,
        &dispatcher,
        None,
        1,
        vec![group_a.clone(), group_b.clone()],
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    let untouched = GroupService::get_by_id(&db.pool, group_b.id).await.unwrap();
    assert_eq!(untouched.status, GroupStatus::Unresolved);
    assert!(dispatcher.recorded().is_empty());
}

#[tokio::test]
async fn merge_picks_lowest_id_as_primary_and_parks_the_rest() {
    let db = TestDb::new().await;
    let group_a = create_group(&db.pool, 1).await;
    let group_b = create_group_in_state(
        &db.pool,
        1,
        GroupStatus::Ignored,
        Some(GroupSubStatus::Forever),
    )
    .await;
    let group_c = create_group(&db.pool, 1).await;

    let dispatcher = RecordingDispatcher::new();
    let result = MergeService::handle_merge(
        &db.pool,
        &dispatcher,
        Some(7),
        1,
        vec![group_c.clone(), group_a.clone(), group_b.clone()],
    )
    .await
    .unwrap();

    assert_eq!(result.parent.id, group_a.id);
    let mut child_ids: Vec<i64> = result.children.iter().map(|g| g.id).collect();
    child_ids.sort_unstable();
    assert_eq!(child_ids, vec![group_b.id, group_c.id]);

    for child_id in &child_ids {
        let child = GroupService::get_by_id(&db.pool, *child_id).await.unwrap();
        assert_eq!(child.status, GroupStatus::PendingMerge);
        assert_eq!(child.substatus, None);
    }
    let parent = GroupService::get_by_id(&db.pool, group_a.id).await.unwrap();
    assert_eq!(parent.status, GroupStatus::Unresolved);

    assert!(dispatcher.recorded().iter().any(|task| matches!(
        task,
        Task::MergeGroups { primary_id, .. } if *primary_id == group_a.id
    )));
}

#[tokio::test]
async fn schedule_group_uses_the_configured_grace_period() {
    let db = TestDb::new().await;
    let group = create_group(&db.pool, 1).await;

    let settings = DeletionSettings {
        group_chunk_size: 100,
        schedule_days: 7,
    };
    let deletion =
        ScheduledDeletionService::schedule_group(&db.pool, &settings, group.id, Some(7))
            .await
            .unwrap();

    assert_eq!(deletion.model_name, "group");
    assert_eq!(deletion.object_id, group.id);

    let grace = deletion.date_scheduled - chrono::Utc::now();
    assert!(grace > chrono::Duration::days(6), "grace was {:?}", grace);
    assert!(grace <= chrono::Duration::days(7), "grace was {:?}", grace);
}

#[tokio::test]
async fn scheduling_a_deletion_twice_upserts_the_row() {
    let db = TestDb::new().await;

    let first = ScheduledDeletionService::schedule(
        &db.pool, "issues", "group", 42, 30, 0, None, Some(7),
    )
    .await
    .unwrap();
    let second = ScheduledDeletionService::schedule(
        &db.pool, "issues", "group", 42, 1, 0, None, Some(7),
    )
    .await
    .unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.date_scheduled < first.date_scheduled);

    let count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM scheduled_deletions WHERE model_name = 'group' AND object_id = 42",
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(count.0, 1);
}

#[tokio::test]
async fn cancel_refuses_once_deletion_is_in_progress() {
    let db = TestDb::new().await;

    ScheduledDeletionService::schedule(&db.pool, "issues", "group", 42, 30, 0, None, None)
        .await
        .unwrap();
    ScheduledDeletionService::mark_in_progress(&db.pool, "group", 42)
        .await
        .unwrap();
    ScheduledDeletionService::cancel(&db.pool, "group", 42)
        .await
        .unwrap();

    assert!(
        ScheduledDeletionService::get(&db.pool, "group", 42)
            .await
            .unwrap()
            .is_some(),
        "in-progress deletion must survive a cancel"
    );
}

#[tokio::test]
async fn cancel_removes_a_pending_schedule() {
    let db = TestDb::new().await;

    ScheduledDeletionService::schedule(&db.pool, "issues", "group", 43, 30, 0, None, None)
        .await
        .unwrap();
    ScheduledDeletionService::cancel(&db.pool, "group", 43)
        .await
        .unwrap();

    assert!(ScheduledDeletionService::get(&db.pool, "group", 43)
        .await
        .unwrap()
        .is_none());

    // Cancelling again is a logged no-op
    ScheduledDeletionService::cancel(&db.pool, "group", 43)
        .await
        .unwrap();
}

//! Merge/Delete orchestrator: bulk operations that reassign or remove
//! grouphash ownership and schedule asynchronous cascading deletion.
//!
//! The synchronous portion only flips status flags and severs hash/inbox
//! links; all heavy cascading work is deferred to out-of-band tasks that
//! retry independently and are idempotent for already-deleted rows.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::DeletionSettings;
use crate::error::{AppError, AppResult};
use crate::models::{AuditEvent, Group, GroupStatus, IssueCategory, ScheduledDeletion};
use crate::tasks::{Task, TaskDispatcher};

/// What kind of deletion was requested, reflected in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteType {
    Delete,
    /// Delete "for good": additionally tombstones the group's hashes so
    /// its identity can never be resurrected
    Discard,
}

pub struct DeletionService;

impl DeletionService {
    /// Deletes a list of groups which all belong to a single project.
    ///
    /// Order of operations: similarity-service forget (best-effort), mark
    /// PENDING_DELETION, audit entries before any destructive step, sever
    /// grouphash/inbox links, then schedule chunked async deletion tasks
    /// sharing one transaction id.
    pub async fn delete_group_list(
        pool: &PgPool,
        dispatcher: &dyn TaskDispatcher,
        settings: &DeletionSettings,
        actor_id: Option<i64>,
        project_id: i32,
        mut groups: Vec<Group>,
        delete_type: DeleteType,
    ) -> AppResult<()> {
        if groups.is_empty() {
            return Ok(());
        }

        // Deterministic sort; for very large deletions the "smaller"
        // groups go first so an interrupted batch loses the least work
        groups.sort_by_key(|group| (group.times_seen, group.id));

        if groups.iter().any(|group| group.project_id != project_id) {
            return Err(AppError::Validation(
                "All groups must belong to the same project".to_string(),
            ));
        }

        let group_ids: Vec<i64> = groups.iter().map(|group| group.id).collect();
        let error_ids: Vec<i64> = groups
            .iter()
            .filter(|group| group.issue_category == IssueCategory::Error)
            .map(|group| group.id)
            .collect();

        let transaction_id = Uuid::new_v4().simple().to_string();
        log::info!(
            "Deleting groups {:?} (project: {}, transaction: {})",
            group_ids,
            project_id,
            transaction_id
        );

        // Tell the similarity service to forget error-category groups
        if !error_ids.is_empty() {
            dispatcher
                .dispatch(Task::SeerDeleteHashes {
                    group_ids: error_ids,
                })
                .await;
        }

        // Groups already pending or mid-deletion are not double-scheduled
        sqlx::query(
            r#"
            UPDATE groups
            SET status = $2, substatus = NULL
            WHERE id = ANY($1) AND status NOT IN ($3, $4)
            "#,
        )
        .bind(&group_ids)
        .bind(GroupStatus::PendingDeletion)
        .bind(GroupStatus::PendingDeletion)
        .bind(GroupStatus::DeletionInProgress)
        .execute(pool)
        .await?;

        // Audit entries go in the moment groups are marked, so provenance
        // survives even if a later step fails
        Self::create_audit_entries(pool, actor_id, project_id, &groups, delete_type, &transaction_id)
            .await?;

        if delete_type == DeleteType::Discard {
            Self::tombstone_groups(pool, actor_id, &groups).await?;
        }

        // Removing grouphash rows prevents new events from associating to
        // the deleted groups; inbox rows would otherwise influence triage
        // queries for groups that are pending deletion
        Self::delete_grouphashes(pool, project_id, &group_ids).await?;
        sqlx::query("DELETE FROM group_inbox WHERE project_id = $1 AND group_id = ANY($2)")
            .bind(project_id)
            .bind(&group_ids)
            .execute(pool)
            .await?;

        // One async task per chunk; a transient failure mid-batch never
        // requires redoing already-scheduled chunks
        for chunk in group_ids.chunks(settings.group_chunk_size.max(1)) {
            dispatcher
                .dispatch(Task::DeleteGroups {
                    project_id,
                    object_ids: chunk.to_vec(),
                    transaction_id: transaction_id.clone(),
                })
                .await;
        }

        Ok(())
    }

    async fn create_audit_entries(
        pool: &PgPool,
        actor_id: Option<i64>,
        project_id: i32,
        groups: &[Group],
        delete_type: DeleteType,
        transaction_id: &str,
    ) -> AppResult<()> {
        let event = match delete_type {
            DeleteType::Delete => AuditEvent::IssueDelete,
            DeleteType::Discard => AuditEvent::IssueDiscard,
        };

        for group in groups {
            sqlx::query(
                r#"
                INSERT INTO audit_log
                    (project_id, actor_id, event, target_object, data, transaction_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(project_id)
            .bind(actor_id)
            .bind(event.as_str())
            .bind(group.id)
            .bind(serde_json::json!({
                "issue_id": group.id,
                "delete_type": match delete_type {
                    DeleteType::Delete => "delete",
                    DeleteType::Discard => "discard",
                },
            }))
            .bind(transaction_id)
            .execute(pool)
            .await?;

            log::info!(
                "Group deleted signal (group: {}, transaction: {})",
                group.id,
                transaction_id
            );
        }

        Ok(())
    }

    /// Snapshots each group into a tombstone and re-points its hashes at
    /// it, permanently retiring the hash values.
    async fn tombstone_groups(
        pool: &PgPool,
        actor_id: Option<i64>,
        groups: &[Group],
    ) -> AppResult<()> {
        for group in groups {
            let tombstone_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO group_tombstones
                    (previous_group_id, project_id, level, message, culprit, data,
                     actor_id, times_seen, last_seen)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (previous_group_id) DO UPDATE SET times_seen = EXCLUDED.times_seen
                RETURNING id
                "#,
            )
            .bind(group.id)
            .bind(group.project_id)
            .bind(group.level)
            .bind(&group.message)
            .bind(&group.culprit)
            .bind(&group.data)
            .bind(actor_id)
            .bind(group.times_seen)
            .bind(group.last_seen)
            .fetch_one(pool)
            .await?;

            // A tombstoned hash must never simultaneously own a live group
            sqlx::query(
                r#"
                UPDATE grouphashes
                SET group_id = NULL, group_tombstone_id = $2
                WHERE group_id = $1
                "#,
            )
            .bind(group.id)
            .bind(tombstone_id)
            .execute(pool)
            .await?;
        }

        Ok(())
    }

    /// Deletes the grouphash rows owned by the given groups, first nulling
    /// any similarity-match back-reference so no metadata row is left
    /// dangling.
    async fn delete_grouphashes(
        pool: &PgPool,
        project_id: i32,
        group_ids: &[i64],
    ) -> AppResult<()> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE grouphash_metadata
            SET seer_matched_grouphash_id = NULL
            WHERE seer_matched_grouphash_id IN (
                SELECT id FROM grouphashes
                WHERE project_id = $1 AND group_id = ANY($2)
            )
            "#,
        )
        .bind(project_id)
        .bind(group_ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM grouphashes WHERE project_id = $1 AND group_id = ANY($2)")
            .bind(project_id)
            .bind(group_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Task body for one deletion chunk: removes the groups and their
    /// dependent rows. Idempotent - deleting something already gone is a
    /// no-op, so the external runner may retry freely.
    pub async fn delete_groups_for_project(
        pool: &PgPool,
        project_id: i32,
        object_ids: &[i64],
        transaction_id: &str,
    ) -> AppResult<()> {
        sqlx::query("UPDATE groups SET status = $2 WHERE id = ANY($1)")
            .bind(object_ids)
            .bind(GroupStatus::DeletionInProgress)
            .execute(pool)
            .await?;

        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE grouphash_metadata
            SET seer_matched_grouphash_id = NULL
            WHERE seer_matched_grouphash_id IN (
                SELECT id FROM grouphashes WHERE group_id = ANY($1)
            )
            "#,
        )
        .bind(object_ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM grouphashes WHERE group_id = ANY($1)")
            .bind(object_ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM group_inbox WHERE group_id = ANY($1)")
            .bind(object_ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM activities WHERE group_id = ANY($1)")
            .bind(object_ids)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM groups WHERE id = ANY($1) AND project_id = $2")
            .bind(object_ids)
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        log::info!(
            "Deleted {} groups (project: {}, transaction: {})",
            deleted.rows_affected(),
            project_id,
            transaction_id
        );

        Ok(())
    }
}

pub struct ScheduledDeletionService;

impl ScheduledDeletionService {
    /// Schedules a group for deletion after the configured grace period.
    pub async fn schedule_group(
        pool: &PgPool,
        settings: &DeletionSettings,
        group_id: i64,
        actor_id: Option<i64>,
    ) -> AppResult<ScheduledDeletion> {
        Self::schedule(
            pool,
            "issues",
            "group",
            group_id,
            settings.schedule_days,
            0,
            None,
            actor_id,
        )
        .await
    }

    /// Schedules (or re-schedules) a deletion. Upserts by
    /// `(app_label, model_name, object_id)` so repeated scheduling is
    /// idempotent.
    pub async fn schedule(
        pool: &PgPool,
        app_label: &str,
        model_name: &str,
        object_id: i64,
        days: i64,
        hours: i64,
        data: Option<&serde_json::Value>,
        actor_id: Option<i64>,
    ) -> AppResult<ScheduledDeletion> {
        let guid = Uuid::new_v4().simple().to_string();
        let date_scheduled = Utc::now() + Duration::days(days) + Duration::hours(hours);

        let deletion = sqlx::query_as::<_, ScheduledDeletion>(
            r#"
            INSERT INTO scheduled_deletions
                (guid, app_label, model_name, object_id, date_scheduled, data, actor_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (app_label, model_name, object_id) DO UPDATE
                SET date_scheduled = EXCLUDED.date_scheduled,
                    data = EXCLUDED.data,
                    actor_id = EXCLUDED.actor_id
            RETURNING *
            "#,
        )
        .bind(&guid)
        .bind(app_label)
        .bind(model_name)
        .bind(object_id)
        .bind(date_scheduled)
        .bind(data.cloned().unwrap_or_else(|| serde_json::json!({})))
        .bind(actor_id)
        .fetch_one(pool)
        .await?;

        log::info!(
            "Deletion queued (model: {}, object: {}, transaction: {})",
            model_name,
            object_id,
            deletion.guid
        );

        Ok(deletion)
    }

    /// Cancels a scheduled deletion. Refused once the deletion task has
    /// flipped `in_progress`; cancelling a missing schedule is a logged
    /// no-op.
    pub async fn cancel(pool: &PgPool, model_name: &str, object_id: i64) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM scheduled_deletions
            WHERE model_name = $1 AND object_id = $2 AND NOT in_progress
            "#,
        )
        .bind(model_name)
        .bind(object_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            log::info!(
                "Deletion cancel had no effect (model: {}, object: {})",
                model_name,
                object_id
            );
        } else {
            log::info!(
                "Deletion canceled (model: {}, object: {})",
                model_name,
                object_id
            );
        }

        Ok(())
    }

    /// Marks a schedule as started, after which cancellation is refused.
    pub async fn mark_in_progress(
        pool: &PgPool,
        model_name: &str,
        object_id: i64,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE scheduled_deletions SET in_progress = TRUE WHERE model_name = $1 AND object_id = $2",
        )
        .bind(model_name)
        .bind(object_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get(
        pool: &PgPool,
        model_name: &str,
        object_id: i64,
    ) -> AppResult<Option<ScheduledDeletion>> {
        let row = sqlx::query_as::<_, ScheduledDeletion>(
            "SELECT * FROM scheduled_deletions WHERE model_name = $1 AND object_id = $2",
        )
        .bind(model_name)
        .bind(object_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }
}

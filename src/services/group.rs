use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{
    ActivityType, Group, GroupPriority, GroupStatus, GroupSubStatus, IssueCategory,
};
use crate::services::activity::ActivityService;

pub struct GroupService;

impl GroupService {
    pub async fn get_by_id(pool: &PgPool, id: i64) -> AppResult<Group> {
        let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))?;

        Ok(group)
    }

    pub async fn get_by_ids(pool: &PgPool, ids: &[i64]) -> AppResult<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await?;

        Ok(groups)
    }

    /// Creates a new group for a first-seen event. Initial state is always
    /// UNRESOLVED/NEW.
    pub async fn create(
        pool: &PgPool,
        project_id: i32,
        message: &str,
        culprit: Option<&str>,
        level: i32,
        issue_category: IssueCategory,
        data: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> AppResult<Group> {
        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (
                project_id, status, substatus, priority, issue_category,
                level, message, culprit, data, times_seen, first_seen, last_seen
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 1, $10, $10)
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(GroupStatus::Unresolved)
        .bind(GroupSubStatus::New)
        .bind(GroupPriority::Medium)
        .bind(issue_category)
        .bind(level)
        .bind(message)
        .bind(culprit)
        .bind(data)
        .bind(timestamp)
        .fetch_one(pool)
        .await?;

        Ok(group)
    }

    /// Updates an existing group for a newly attached event
    pub async fn update_for_new_event(
        pool: &PgPool,
        group_id: i64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<Group> {
        let group = sqlx::query_as::<_, Group>(
            r#"
            UPDATE groups
            SET last_seen = GREATEST(last_seen, $2),
                times_seen = times_seen + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(group_id)
        .bind(timestamp)
        .fetch_one(pool)
        .await?;

        Ok(group)
    }

    /// Writes a validated status/substatus pair and the matching activity
    /// row in one transaction.
    pub async fn update_group_status(
        pool: &PgPool,
        group: &Group,
        status: GroupStatus,
        substatus: Option<GroupSubStatus>,
        activity_type: ActivityType,
        activity_data: Option<&serde_json::Value>,
    ) -> AppResult<Group> {
        let mut tx = pool.begin().await?;

        let updated = sqlx::query_as::<_, Group>(
            r#"
            UPDATE groups
            SET status = $2, substatus = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(group.id)
        .bind(status)
        .bind(substatus)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO activities (project_id, group_id, activity_type, data)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(group.project_id)
        .bind(group.id)
        .bind(activity_type)
        .bind(activity_data.cloned().unwrap_or_else(|| serde_json::json!({})))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    /// Recalculates priority when a group escalates
    pub async fn set_priority(
        pool: &PgPool,
        group_id: i64,
        priority: GroupPriority,
    ) -> AppResult<()> {
        sqlx::query("UPDATE groups SET priority = $2 WHERE id = $1")
            .bind(group_id)
            .bind(priority)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Records an activity without a status write
    pub async fn record_activity(
        pool: &PgPool,
        group: &Group,
        activity_type: ActivityType,
        data: Option<&serde_json::Value>,
    ) -> AppResult<()> {
        ActivityService::create(pool, group.project_id, group.id, activity_type, data).await?;
        Ok(())
    }
}

use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::{Activity, ActivityType};

pub struct ActivityService;

impl ActivityService {
    /// Records an activity row against a group
    pub async fn create(
        pool: &PgPool,
        project_id: i32,
        group_id: i64,
        activity_type: ActivityType,
        data: Option<&serde_json::Value>,
    ) -> AppResult<Activity> {
        let activity = sqlx::query_as::<_, Activity>(
            r#"
            INSERT INTO activities (project_id, group_id, activity_type, data)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(group_id)
        .bind(activity_type)
        .bind(data.cloned().unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(pool)
        .await?;

        Ok(activity)
    }

    /// Most recent activity of the given type for a group
    pub async fn latest_for_group(
        pool: &PgPool,
        group_id: i64,
        activity_type: ActivityType,
    ) -> AppResult<Option<Activity>> {
        let activity = sqlx::query_as::<_, Activity>(
            r#"
            SELECT * FROM activities
            WHERE group_id = $1 AND activity_type = $2
            ORDER BY datetime DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(group_id)
        .bind(activity_type)
        .fetch_optional(pool)
        .await?;

        Ok(activity)
    }

    pub async fn count_for_group(
        pool: &PgPool,
        group_id: i64,
        activity_type: ActivityType,
    ) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM activities WHERE group_id = $1 AND activity_type = $2",
        )
        .bind(group_id)
        .bind(activity_type)
        .fetch_one(pool)
        .await?;

        Ok(count.0)
    }
}

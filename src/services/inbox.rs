use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::{Group, GroupInbox, GroupInboxReason, GroupInboxRemoveAction};

pub struct InboxService;

impl InboxService {
    /// Puts a group into the triage inbox. A group is in the inbox at most
    /// once; re-adding updates the reason.
    pub async fn add_group_to_inbox(
        pool: &PgPool,
        group: &Group,
        reason: GroupInboxReason,
    ) -> AppResult<GroupInbox> {
        let row = sqlx::query_as::<_, GroupInbox>(
            r#"
            INSERT INTO group_inbox (project_id, group_id, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (group_id) DO UPDATE SET reason = EXCLUDED.reason
            RETURNING *
            "#,
        )
        .bind(group.project_id)
        .bind(group.id)
        .bind(reason)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// Takes a group out of the inbox. Removing an absent group is a no-op.
    pub async fn remove_group_from_inbox(
        pool: &PgPool,
        group: &Group,
        action: GroupInboxRemoveAction,
    ) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM group_inbox WHERE group_id = $1")
            .bind(group.id)
            .execute(pool)
            .await?;

        if result.rows_affected() > 0 {
            log::debug!(
                "Removed group {} from inbox (reason: {})",
                group.id,
                action.as_str()
            );
        }

        Ok(())
    }

    pub async fn get_for_group(pool: &PgPool, group_id: i64) -> AppResult<Option<GroupInbox>> {
        let row = sqlx::query_as::<_, GroupInbox>("SELECT * FROM group_inbox WHERE group_id = $1")
            .bind(group_id)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }
}

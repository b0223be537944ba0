use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ActivityType, Group, GroupStatus, IssueCategory};
use crate::services::activity::ActivityService;
use crate::tasks::{Task, TaskDispatcher};

/// Outcome of a merge request: the surviving primary and the groups that
/// will be folded into it asynchronously.
#[derive(Debug)]
pub struct MergeResult {
    pub parent: Group,
    pub children: Vec<Group>,
}

pub struct MergeService;

impl MergeService {
    /// Merges a set of groups into the oldest one (lowest id).
    ///
    /// Only error-category issues can be merged; the guard runs before
    /// any row is touched so a rejected request leaves no trace. The
    /// non-primary groups are parked in `PendingMerge` and the actual
    /// event migration happens in an async task.
    pub async fn handle_merge(
        pool: &PgPool,
        dispatcher: &dyn TaskDispatcher,
        actor_id: Option<i64>,
        project_id: i32,
        mut groups: Vec<Group>,
    ) -> AppResult<MergeResult> {
        if groups.len() < 2 {
            return Err(AppError::Validation(
                "Merging requires at least two groups".to_string(),
            ));
        }

        if groups
            .iter()
            .any(|group| group.issue_category != IssueCategory::Error)
        {
            return Err(AppError::Validation(
                "Only error issues can be merged.".to_string(),
            ));
        }

        // The oldest group survives as the merge target
        groups.sort_by_key(|group| group.id);
        let parent = groups.remove(0);
        let children = groups;
        let child_ids: Vec<i64> = children.iter().map(|group| group.id).collect();

        let transaction_id = Uuid::new_v4().simple().to_string();
        log::info!(
            "Merging groups {:?} into {} (project: {}, transaction: {})",
            child_ids,
            parent.id,
            project_id,
            transaction_id
        );

        sqlx::query(
            "UPDATE groups SET status = $2, substatus = NULL WHERE id = ANY($1)",
        )
        .bind(&child_ids)
        .bind(GroupStatus::PendingMerge)
        .execute(pool)
        .await?;

        ActivityService::create(
            pool,
            parent.project_id,
            parent.id,
            ActivityType::Merge,
            Some(&serde_json::json!({ "issues": child_ids })),
        )
        .await?;

        sqlx::query(
            r#"
            INSERT INTO audit_log
                (project_id, actor_id, event, target_object, data, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(project_id)
        .bind(actor_id)
        .bind(crate::models::AuditEvent::IssueMerge.as_str())
        .bind(parent.id)
        .bind(serde_json::json!({ "parent": parent.id, "issues": child_ids }))
        .bind(&transaction_id)
        .execute(pool)
        .await?;

        dispatcher
            .dispatch(Task::MergeGroups {
                project_id,
                primary_id: parent.id,
                source_ids: child_ids,
                transaction_id,
            })
            .await;

        Ok(MergeResult { parent, children })
    }
}

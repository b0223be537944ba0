//! Event-to-group assignment: runs the grouping pipeline over an ingested
//! event and attaches it to an existing group or creates a new one.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::config::GroupingSettings;
use crate::error::{AppError, AppResult};
use crate::grouping::{
    maybe_run_background_grouping, maybe_run_secondary_grouping, run_primary_grouping,
    GroupingResult, ProjectGroupingOptions,
};
use crate::models::{Event, Group, GroupHash, IssueCategory};
use crate::services::{GroupHashService, GroupResolver, GroupService};

/// Outcome of assigning one event
#[derive(Debug)]
pub enum AssignOutcome {
    /// The event was attached to this group; `is_new` is true when the
    /// group was created for it
    Assigned { group: Group, is_new: bool },
    /// The event's hash was tombstoned; the event has been dropped
    Discarded { tombstone_id: i64 },
}

/// Runs grouping for an event and resolves (or creates) its group.
///
/// Primary hashes decide the group. During a config transition, secondary
/// hashes are computed with the previous config and consulted too, so a
/// changed primary hash still finds the group the old config built.
pub async fn assign_event_to_group(
    pool: &PgPool,
    event: &Event,
    options: &ProjectGroupingOptions,
    settings: &GroupingSettings,
) -> AppResult<AssignOutcome> {
    let primary = run_primary_grouping(event, options)?;
    let secondary = maybe_run_secondary_grouping(event, options);
    maybe_run_background_grouping(event, options, settings);

    let mut grouphashes = persist_hashes(pool, event, &primary, options).await?;
    if let Some(secondary) = &secondary {
        grouphashes.extend(persist_hashes(pool, event, secondary, options).await?);
    }

    let timestamp = event_timestamp(event);

    match GroupResolver::find_grouphash_with_group(&grouphashes) {
        Ok(Some(existing)) => {
            let group_id = match existing.group_id {
                Some(id) => id,
                None => return Err(AppError::Internal("Resolved grouphash lost its group".to_string())),
            };

            let group = GroupService::update_for_new_event(pool, group_id, timestamp).await?;
            claim_unowned(pool, &grouphashes, group.id).await?;

            Ok(AssignOutcome::Assigned {
                group,
                is_new: false,
            })
        }
        Ok(None) => {
            // A matched fingerprint rule may carry a title that replaces
            // the exception-derived one
            let message = match primary.title_override.clone() {
                Some(title) => title,
                None => {
                    let (exc_type, exc_value) = event.type_and_value();
                    if exc_value.is_empty() {
                        exc_type
                    } else {
                        format!("{}: {}", exc_type, exc_value)
                    }
                }
            };

            let group = GroupService::create(
                pool,
                event.project_id,
                &message,
                event.transaction(),
                level_to_number(event.level()),
                IssueCategory::Error,
                &event.data,
                timestamp,
            )
            .await?;
            claim_unowned(pool, &grouphashes, group.id).await?;

            Ok(AssignOutcome::Assigned {
                group,
                is_new: true,
            })
        }
        Err(AppError::HashDiscarded { tombstone_id }) => {
            metrics::counter!("grouping.event.discarded").increment(1);
            log::debug!(
                "Event {} discarded by tombstone {}",
                event.event_id,
                tombstone_id
            );
            Ok(AssignOutcome::Discarded { tombstone_id })
        }
        Err(err) => Err(err),
    }
}

async fn persist_hashes(
    pool: &PgPool,
    event: &Event,
    result: &GroupingResult,
    options: &ProjectGroupingOptions,
) -> AppResult<Vec<GroupHash>> {
    GroupHashService::get_or_create_grouphashes(
        pool,
        event,
        event.project_id,
        &result.variants,
        &result.hashes,
        &result.grouping_config_id,
        options,
    )
    .await
}

async fn claim_unowned(
    pool: &PgPool,
    grouphashes: &[GroupHash],
    group_id: i64,
) -> AppResult<()> {
    let unowned: Vec<i64> = grouphashes
        .iter()
        .filter(|gh| gh.group_id.is_none() && gh.group_tombstone_id.is_none())
        .map(|gh| gh.id)
        .collect();

    if unowned.is_empty() {
        return Ok(());
    }

    GroupHashService::claim_for_group(pool, &unowned, group_id).await
}

fn event_timestamp(event: &Event) -> DateTime<Utc> {
    event
        .data
        .get("timestamp")
        .and_then(|t| t.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn level_to_number(level: Option<&str>) -> i32 {
    match level {
        Some("debug") => 10,
        Some("info") => 20,
        Some("warning") => 30,
        Some("fatal") => 50,
        _ => 40,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_mapping_defaults_to_error() {
        assert_eq!(level_to_number(Some("debug")), 10);
        assert_eq!(level_to_number(Some("nonsense")), 40);
        assert_eq!(level_to_number(None), 40);
    }

    #[test]
    fn timestamp_falls_back_to_now() {
        let event = Event::new(
            uuid::Uuid::new_v4(),
            1,
            serde_json::json!({ "timestamp": "2024-05-01T12:00:00Z" }),
        );
        let parsed = event_timestamp(&event);
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }
}

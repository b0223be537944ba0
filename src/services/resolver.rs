use std::collections::HashMap;

use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{Group, GroupHash};

pub struct GroupResolver;

impl GroupResolver {
    /// Scans grouphashes in priority order and returns the first one with a
    /// group assigned. A tombstoned hash encountered before any
    /// group-bearing hash fails resolution with `HashDiscarded`: the event
    /// must be dropped, not grouped and not retried.
    pub fn find_grouphash_with_group(grouphashes: &[GroupHash]) -> AppResult<Option<&GroupHash>> {
        for grouphash in grouphashes {
            if grouphash.group_id.is_some() {
                return Ok(Some(grouphash));
            }

            // TODO: Tombstones may get ignored entirely if there is another
            // hash *before* that happens to have a group_id. This bug may
            // not have been noticed for a long time because most events
            // only ever have 1-2 hashes.
            if let Some(tombstone_id) = grouphash.group_tombstone_id {
                return Err(AppError::HashDiscarded {
                    tombstone_id,
                });
            }
        }

        Ok(None)
    }

    pub async fn get_group_from_fingerprint(
        pool: &PgPool,
        project_id: i32,
        fingerprint: &[String],
    ) -> AppResult<Option<Group>> {
        let mut results =
            Self::bulk_get_groups_from_fingerprints(pool, &[(project_id, fingerprint.to_vec())])
                .await?;
        Ok(results.remove(&(project_id, fingerprint.to_vec())))
    }

    /// Returns a map of `(project, fingerprint)` to the owning group.
    ///
    /// When a fingerprint maps to multiple groups, the group matching its
    /// first hash wins - the same first-match priority as single lookup.
    /// Missing resolutions are counted via a metric, not treated as errors.
    pub async fn bulk_get_groups_from_fingerprints(
        pool: &PgPool,
        project_fingerprint_pairs: &[(i32, Vec<String>)],
    ) -> AppResult<HashMap<(i32, Vec<String>), Group>> {
        let mut hashes_by_project: HashMap<i32, Vec<String>> = HashMap::new();
        for (project_id, hashes) in project_fingerprint_pairs {
            hashes_by_project
                .entry(*project_id)
                .or_default()
                .extend(hashes.iter().cloned());
        }

        let mut groups_by_hash: HashMap<(i32, String), Group> = HashMap::new();
        for (project_id, hashes) in &hashes_by_project {
            let mapping: Vec<(String, i64)> = sqlx::query_as(
                r#"
                SELECT hash, group_id FROM grouphashes
                WHERE project_id = $1 AND hash = ANY($2) AND group_id IS NOT NULL
                "#,
            )
            .bind(project_id)
            .bind(hashes)
            .fetch_all(pool)
            .await?;

            if mapping.is_empty() {
                continue;
            }

            let group_ids: Vec<i64> = mapping.iter().map(|(_, group_id)| *group_id).collect();
            let groups = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = ANY($1)")
                .bind(&group_ids)
                .fetch_all(pool)
                .await?;
            let groups_by_id: HashMap<i64, Group> =
                groups.into_iter().map(|group| (group.id, group)).collect();

            for (hash, group_id) in mapping {
                if let Some(group) = groups_by_id.get(&group_id) {
                    groups_by_hash.insert((*project_id, hash), group.clone());
                }
            }
        }

        let mut result = HashMap::new();
        for (project_id, fingerprint) in project_fingerprint_pairs {
            // First hash in the fingerprint that resolved wins
            for hash in fingerprint {
                if let Some(group) = groups_by_hash.get(&(*project_id, hash.clone())) {
                    result.insert((*project_id, fingerprint.clone()), group.clone());
                    break;
                }
            }
        }

        let missing = project_fingerprint_pairs.len().saturating_sub(result.len());
        if missing > 0 {
            metrics::counter!("grouping.grouphash.not_found").increment(missing as u64);
        }

        Ok(result)
    }
}

use std::collections::BTreeMap;

use sqlx::PgPool;

use crate::error::AppResult;
use crate::grouping::{variants_digest, ProjectGroupingOptions, Variant};
use crate::models::{Event, GroupHash, GroupHashMetadata};

pub struct GroupHashService;

impl GroupHashService {
    /// Gets or creates `(project, hash)` rows for the computed hashes, in
    /// hash priority order.
    ///
    /// Creation is race-safe: concurrent workers ingesting events that
    /// share a hash converge on one row through the store's uniqueness
    /// constraint, with the duplicate-key race absorbed by re-reading.
    ///
    /// When the hashes come from the project's secondary config, only hash
    /// values that already exist are kept: the sole utility of secondary
    /// hashes is to link new primary hashes to an existing group, so
    /// net-new ones are discarded as noise.
    pub async fn get_or_create_grouphashes(
        pool: &PgPool,
        event: &Event,
        project_id: i32,
        variants: &BTreeMap<String, Variant>,
        hashes: &[String],
        grouping_config_id: &str,
        options: &ProjectGroupingOptions,
    ) -> AppResult<Vec<GroupHash>> {
        let is_secondary = options.secondary_config.as_deref() == Some(grouping_config_id);

        let hashes: Vec<String> = if is_secondary {
            let existing: Vec<String> = sqlx::query_scalar(
                "SELECT hash FROM grouphashes WHERE project_id = $1 AND hash = ANY($2)",
            )
            .bind(project_id)
            .bind(hashes)
            .fetch_all(pool)
            .await?;

            hashes
                .iter()
                .filter(|hash| existing.contains(hash))
                .cloned()
                .collect()
        } else {
            hashes.to_vec()
        };

        let mut grouphashes = Vec::with_capacity(hashes.len());
        for hash_value in &hashes {
            let (grouphash, created) =
                Self::get_or_create(pool, project_id, hash_value).await?;

            if created {
                // Metadata is observability-only; a failure here must never
                // block ingestion
                if let Err(err) = Self::create_metadata(
                    pool,
                    grouphash.id,
                    grouping_config_id,
                    variants,
                    None,
                )
                .await
                {
                    log::warn!(
                        "Failed to record grouphash metadata for event {}: {}",
                        event.event_id,
                        err
                    );
                }
            }

            grouphashes.push(grouphash);
        }

        Ok(grouphashes)
    }

    /// Atomic get-or-create for a single `(project, hash)` row
    pub async fn get_or_create(
        pool: &PgPool,
        project_id: i32,
        hash: &str,
    ) -> AppResult<(GroupHash, bool)> {
        // The unique constraint is the source of truth; a losing writer
        // falls through to the read
        let inserted = sqlx::query_as::<_, GroupHash>(
            r#"
            INSERT INTO grouphashes (project_id, hash)
            VALUES ($1, $2)
            ON CONFLICT (project_id, hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(hash)
        .fetch_optional(pool)
        .await?;

        if let Some(grouphash) = inserted {
            return Ok((grouphash, true));
        }

        let existing = sqlx::query_as::<_, GroupHash>(
            "SELECT * FROM grouphashes WHERE project_id = $1 AND hash = $2",
        )
        .bind(project_id)
        .bind(hash)
        .fetch_one(pool)
        .await?;

        Ok((existing, false))
    }

    async fn create_metadata(
        pool: &PgPool,
        grouphash_id: i64,
        grouping_config_id: &str,
        variants: &BTreeMap<String, Variant>,
        seer_matched_grouphash_id: Option<i64>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO grouphash_metadata
                (grouphash_id, grouping_config, hashing_metadata, seer_matched_grouphash_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (grouphash_id) DO NOTHING
            "#,
        )
        .bind(grouphash_id)
        .bind(grouping_config_id)
        .bind(variants_digest(variants))
        .bind(seer_matched_grouphash_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Records that the similarity service matched this hash to another one
    pub async fn record_seer_match(
        pool: &PgPool,
        grouphash_id: i64,
        matched_grouphash_id: i64,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE grouphash_metadata SET seer_matched_grouphash_id = $2 WHERE grouphash_id = $1",
        )
        .bind(grouphash_id)
        .bind(matched_grouphash_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Points every unclaimed hash in the list at the given group. Hashes
    /// that already have an owner or a tombstone are left alone.
    pub async fn claim_for_group(
        pool: &PgPool,
        grouphash_ids: &[i64],
        group_id: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE grouphashes
            SET group_id = $2
            WHERE id = ANY($1) AND group_id IS NULL AND group_tombstone_id IS NULL
            "#,
        )
        .bind(grouphash_ids)
        .bind(group_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_hashes(
        pool: &PgPool,
        project_id: i32,
        hashes: &[String],
    ) -> AppResult<Vec<GroupHash>> {
        let rows = sqlx::query_as::<_, GroupHash>(
            "SELECT * FROM grouphashes WHERE project_id = $1 AND hash = ANY($2)",
        )
        .bind(project_id)
        .bind(hashes)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_for_group(pool: &PgPool, group_id: i64) -> AppResult<Vec<GroupHash>> {
        let rows =
            sqlx::query_as::<_, GroupHash>("SELECT * FROM grouphashes WHERE group_id = $1")
                .bind(group_id)
                .fetch_all(pool)
                .await?;

        Ok(rows)
    }

    pub async fn get_metadata(
        pool: &PgPool,
        grouphash_id: i64,
    ) -> AppResult<Option<GroupHashMetadata>> {
        let row = sqlx::query_as::<_, GroupHashMetadata>(
            "SELECT * FROM grouphash_metadata WHERE grouphash_id = $1",
        )
        .bind(grouphash_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }
}

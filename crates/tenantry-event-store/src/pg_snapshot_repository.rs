//! `PostgreSQL` implementation of the `SnapshotRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use tenantry_core::aggregate::AggregateType;
use tenantry_core::error::DomainError;
use tenantry_core::snapshot::{NewSnapshot, SnapshotRepository, StoredSnapshot};

use crate::error::map_sqlx_error;

/// PostgreSQL-backed snapshot repository.
#[derive(Debug, Clone)]
pub struct PgSnapshotRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    aggregate_id: Uuid,
    aggregate_type: String,
    version: i64,
    state: Value,
    created_at: DateTime<Utc>,
}

impl From<SnapshotRow> for StoredSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            version: row.version,
            state: row.state,
            created_at: row.created_at,
        }
    }
}

impl PgSnapshotRepository {
    /// Creates a new `PgSnapshotRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for PgSnapshotRepository {
    #[instrument(skip(self, snapshot), fields(aggregate_id = %snapshot.aggregate_id, version = snapshot.version))]
    async fn persist_snapshot(&self, snapshot: NewSnapshot) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, state, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id, version) DO UPDATE
            SET aggregate_type = EXCLUDED.aggregate_type,
                state = EXCLUDED.state,
                created_at = EXCLUDED.created_at
            ",
        )
        .bind(snapshot.aggregate_id)
        .bind(snapshot.aggregate_type.as_str())
        .bind(snapshot.version)
        .bind(sqlx::types::Json(&snapshot.state))
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!("persisted snapshot");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_latest_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<StoredSnapshot>, DomainError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r"
            SELECT aggregate_id, aggregate_type, version, state, created_at
            FROM snapshots
            WHERE aggregate_id = $1
            ORDER BY version DESC
            LIMIT 1
            ",
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(StoredSnapshot::from))
    }

    #[instrument(skip(self, patterns), fields(patterns_len = patterns.len()))]
    async fn find_latest_snapshots_matching(
        &self,
        aggregate_type: AggregateType,
        patterns: &[Value],
    ) -> Result<Vec<StoredSnapshot>, DomainError> {
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r"
            SELECT latest.aggregate_id, latest.aggregate_type, latest.version, latest.state, latest.created_at
            FROM (
                SELECT DISTINCT ON (aggregate_id)
                    aggregate_id, aggregate_type, version, state, created_at
                FROM snapshots
                WHERE aggregate_type = $1
                ORDER BY aggregate_id, version DESC
            ) AS latest
            WHERE EXISTS (
                SELECT 1
                FROM jsonb_array_elements($2) AS p(pattern)
                WHERE latest.state @> p.pattern
            )
            ORDER BY latest.aggregate_id
            ",
        )
        .bind(aggregate_type.as_str())
        .bind(sqlx::types::Json(patterns))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(matched = rows.len(), "scanned latest snapshots");
        Ok(rows.into_iter().map(StoredSnapshot::from).collect())
    }

    #[instrument(skip(self))]
    async fn prune_snapshots(
        &self,
        aggregate_id: Uuid,
        below_version: i64,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM snapshots WHERE aggregate_id = $1 AND version < $2")
            .bind(aggregate_id)
            .bind(below_version)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

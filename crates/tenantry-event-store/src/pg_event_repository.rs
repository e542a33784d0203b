//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use tenantry_core::error::DomainError;
use tenantry_core::repository::{
    EventRepository, NewEvent, StoredEvent, batch_aggregate_id, plan_append,
};

use crate::error::{is_other_unique_violation, is_version_collision, map_sqlx_error};

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    tenant_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    version: i64,
    #[sqlx(rename = "type")]
    event_type: String,
    data: serde_json::Value,
    meta: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.id,
            tenant_id: row.tenant_id,
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            version: row.version,
            event_type: row.event_type,
            data: row.data,
            meta: row.meta,
            created_at: row.created_at,
        }
    }
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
    ) -> Result<i64, DomainError> {
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM events WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(map_sqlx_error)
    }

    /// Reads the committed head after a losing insert, outside the aborted
    /// transaction.
    async fn committed_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM events WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    #[instrument(skip(self, events), fields(events_len = events.len()))]
    async fn append(
        &self,
        events: &[NewEvent],
        expected_version: Option<i64>,
    ) -> Result<(), DomainError> {
        let Some(aggregate_id) = batch_aggregate_id(events)? else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let current = Self::current_version(&mut tx, aggregate_id).await?;
        let versions = plan_append(aggregate_id, events, current, expected_version)?;
        let first_version = current + 1;

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO events (id, tenant_id, aggregate_id, aggregate_type, version, type, data, meta, created_at) ",
        );
        qb.push_values(events.iter().zip(versions), |mut b, (event, version)| {
            b.push_bind(event.event_id);
            b.push_bind(event.tenant_id);
            b.push_bind(event.aggregate_id);
            b.push_bind(event.aggregate_type.as_str());
            b.push_bind(version);
            b.push_bind(event.event_type.as_str());
            b.push_bind(sqlx::types::Json(&event.data));
            b.push_bind(sqlx::types::Json(&event.meta));
            b.push_bind(event.created_at);
        });

        if let Err(error) = qb.build().execute(&mut *tx).await {
            if is_version_collision(&error) {
                // A concurrent writer committed between our read and insert.
                drop(tx);
                let actual = self.committed_version(aggregate_id).await?;
                warn!(%aggregate_id, expected = first_version - 1, actual, "append lost a version race");
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version.unwrap_or(first_version - 1),
                    actual,
                });
            }
            if is_other_unique_violation(&error) {
                return Err(DomainError::Validation(format!(
                    "append batch reuses an existing event id: {error}"
                )));
            }
            return Err(map_sqlx_error(error));
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(%aggregate_id, first_version, count = events.len(), "appended events");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_stream(
        &self,
        aggregate_id: Uuid,
        from_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r"
            SELECT id, tenant_id, aggregate_id, aggregate_type, version, type, data, meta, created_at
            FROM events
            WHERE aggregate_id = $1 AND version >= $2
            ORDER BY version ASC
            ",
        )
        .bind(aggregate_id)
        .bind(from_version.unwrap_or(1))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }
}

//! Event log abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::aggregate::AggregateType;
use crate::error::DomainError;

/// An event about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Unique event identifier, assigned at creation.
    pub event_id: Uuid,
    /// Owning organization scope.
    pub tenant_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type owning the version sequence.
    pub aggregate_type: AggregateType,
    /// Explicit version, or `None` to have the log assign the next one.
    pub version: Option<i64>,
    /// Namespaced fact tag.
    pub event_type: String,
    /// Fact content.
    pub data: serde_json::Value,
    /// Cross-cutting references (correlation, session).
    pub meta: serde_json::Value,
    /// Fact timestamp.
    pub created_at: DateTime<Utc>,
}

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Owning organization scope.
    pub tenant_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Raw aggregate type tag as stored. Storage is shared, so this may name
    /// a type the reader does not care about.
    pub aggregate_type: String,
    /// Version within the aggregate stream.
    pub version: i64,
    /// Namespaced fact tag.
    pub event_type: String,
    /// Fact content.
    pub data: serde_json::Value,
    /// Cross-cutting references.
    pub meta: serde_json::Value,
    /// Fact timestamp.
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Materializes a new event at its assigned version.
    #[must_use]
    pub fn from_new(event: &NewEvent, version: i64) -> Self {
        Self {
            event_id: event.event_id,
            tenant_id: event.tenant_id,
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type.as_str().to_owned(),
            version,
            event_type: event.event_type.clone(),
            data: event.data.clone(),
            meta: event.meta.clone(),
            created_at: event.created_at,
        }
    }
}

/// Repository trait for the append-only event log.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Atomically appends a batch of events for a single aggregate.
    ///
    /// When `expected_version` is given, the batch is rejected with
    /// `DomainError::ConcurrencyConflict` unless it equals the current
    /// highest version. An empty batch is a no-op.
    async fn append(
        &self,
        events: &[NewEvent],
        expected_version: Option<i64>,
    ) -> Result<(), DomainError>;

    /// Loads events for an aggregate in ascending version order, starting at
    /// `from_version` (inclusive) when given.
    async fn load_stream(
        &self,
        aggregate_id: Uuid,
        from_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError>;
}

/// Checks that a batch targets a single aggregate and returns its id, or
/// `None` for an empty batch.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the batch mixes aggregates or
/// aggregate types.
pub fn batch_aggregate_id(events: &[NewEvent]) -> Result<Option<Uuid>, DomainError> {
    let Some(first) = events.first() else {
        return Ok(None);
    };
    if let Some(stray) = events
        .iter()
        .find(|e| e.aggregate_id != first.aggregate_id || e.aggregate_type != first.aggregate_type)
    {
        return Err(DomainError::Validation(format!(
            "append batch mixes aggregates: {} ({}) and {} ({})",
            first.aggregate_id, first.aggregate_type, stray.aggregate_id, stray.aggregate_type
        )));
    }
    Ok(Some(first.aggregate_id))
}

/// Decides the versions a non-empty batch will be stored at, given the
/// current highest version read inside the append transaction.
///
/// Every store implementation runs this same planning step so that their
/// conflict and gap behaviour is identical.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if `expected_version` is stale
/// or explicit versions collide with existing history, and
/// `DomainError::Validation` if explicit versions are partial, not
/// consecutive, or would leave a gap.
pub fn plan_append(
    aggregate_id: Uuid,
    events: &[NewEvent],
    current_version: i64,
    expected_version: Option<i64>,
) -> Result<Vec<i64>, DomainError> {
    if let Some(expected) = expected_version {
        if expected != current_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current_version,
            });
        }
    }

    let explicit: Vec<i64> = events.iter().filter_map(|e| e.version).collect();
    if explicit.is_empty() {
        let count = i64::try_from(events.len())
            .map_err(|_| DomainError::Validation("append batch is too large".into()))?;
        return Ok((1..=count).map(|offset| current_version + offset).collect());
    }
    if explicit.len() != events.len() {
        return Err(DomainError::Validation(
            "append batch must assign versions to every event or to none".into(),
        ));
    }
    if explicit.windows(2).any(|pair| pair[1] != pair[0] + 1) {
        return Err(DomainError::Validation(format!(
            "explicit versions must be consecutive: {explicit:?}"
        )));
    }

    let first = explicit[0];
    if first < 1 {
        return Err(DomainError::Validation(format!(
            "versions start at 1, got {first}"
        )));
    }
    if first <= current_version {
        return Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected: first - 1,
            actual: current_version,
        });
    }
    if first > current_version + 1 {
        return Err(DomainError::Validation(format!(
            "version {first} would leave a gap after version {current_version} of aggregate {aggregate_id}"
        )));
    }
    Ok(explicit)
}

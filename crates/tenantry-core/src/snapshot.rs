//! Snapshot store abstraction.
//!
//! Snapshots are a derived cache of folded state at a known event version.
//! They are never authoritative: the event log alone is always sufficient to
//! rebuild state, so every write here is best-effort from the caller's point
//! of view.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::aggregate::AggregateType;
use crate::error::DomainError;

/// A snapshot about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    /// Aggregate the state belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type of the state.
    pub aggregate_type: AggregateType,
    /// Event-log version this state reflects.
    pub version: i64,
    /// Fully folded state.
    pub state: Value,
    /// Snapshot timestamp.
    pub created_at: DateTime<Utc>,
}

/// A persisted snapshot row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    /// Aggregate the state belongs to.
    pub aggregate_id: Uuid,
    /// Raw aggregate type tag as stored.
    pub aggregate_type: String,
    /// Event-log version this state reflects.
    pub version: i64,
    /// Fully folded state.
    pub state: Value,
    /// Snapshot timestamp.
    pub created_at: DateTime<Utc>,
}

impl StoredSnapshot {
    /// Materializes a snapshot write as the stored row.
    #[must_use]
    pub fn from_new(snapshot: &NewSnapshot) -> Self {
        Self {
            aggregate_id: snapshot.aggregate_id,
            aggregate_type: snapshot.aggregate_type.as_str().to_owned(),
            version: snapshot.version,
            state: snapshot.state.clone(),
            created_at: snapshot.created_at,
        }
    }
}

/// Repository trait for snapshot persistence.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Upserts the snapshot keyed by `(aggregate_id, version)`. Writing the
    /// same version twice overwrites.
    async fn persist_snapshot(&self, snapshot: NewSnapshot) -> Result<(), DomainError>;

    /// Returns the highest-version snapshot for the aggregate, if any.
    async fn load_latest_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<StoredSnapshot>, DomainError>;

    /// Returns the latest snapshot of every aggregate of `aggregate_type`
    /// whose state contains at least one of `patterns`, using JSONB
    /// containment semantics (see [`state_contains`]).
    async fn find_latest_snapshots_matching(
        &self,
        aggregate_type: AggregateType,
        patterns: &[Value],
    ) -> Result<Vec<StoredSnapshot>, DomainError>;

    /// Deletes snapshots of the aggregate below `below_version` and returns
    /// how many were removed.
    async fn prune_snapshots(
        &self,
        aggregate_id: Uuid,
        below_version: i64,
    ) -> Result<u64, DomainError>;
}

/// Snapshot creation policy.
///
/// | Policy | Best for |
/// |--------|----------|
/// | `Always` | read-heavy aggregates, low write volume |
/// | `EveryNEvents(n)` | most aggregates |
/// | `Never` | short-lived aggregates, or snapshots managed elsewhere |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotPolicy {
    /// Snapshot after every commit.
    #[default]
    Always,
    /// Snapshot once at least N events accumulated since the last snapshot.
    EveryNEvents(u64),
    /// Never snapshot.
    Never,
}

impl SnapshotPolicy {
    /// Builds a policy from an "every N events" setting, where 0 disables
    /// snapshotting and 1 snapshots every commit.
    #[must_use]
    pub const fn every(n: u64) -> Self {
        match n {
            0 => Self::Never,
            1 => Self::Always,
            n => Self::EveryNEvents(n),
        }
    }

    /// Decides whether a commit that brought the aggregate to `new_version`
    /// should be snapshotted, given the version of the last snapshot.
    #[must_use]
    pub fn should_snapshot(self, new_version: i64, last_snapshot_version: Option<i64>) -> bool {
        let since = new_version - last_snapshot_version.unwrap_or(0);
        match self {
            Self::Always => since > 0,
            Self::EveryNEvents(threshold) => u64::try_from(since).is_ok_and(|s| s >= threshold),
            Self::Never => false,
        }
    }
}

/// JSONB containment (`state @> pattern`): objects match when every key of
/// the pattern is contained in the same key of the state, arrays match when
/// every pattern element is contained in some state element, scalars match
/// by equality. A scalar pattern is also contained in a root array holding
/// it, but not in nested arrays.
#[must_use]
pub fn state_contains(state: &Value, pattern: &Value) -> bool {
    match (state, pattern) {
        (Value::Array(items), scalar) if !scalar.is_object() && !scalar.is_array() => {
            items.contains(scalar)
        }
        _ => contains(state, pattern),
    }
}

fn contains(state: &Value, pattern: &Value) -> bool {
    match (state, pattern) {
        (Value::Object(state), Value::Object(pattern)) => pattern
            .iter()
            .all(|(key, wanted)| state.get(key).is_some_and(|found| contains(found, wanted))),
        (Value::Array(state), Value::Array(pattern)) => pattern
            .iter()
            .all(|wanted| state.iter().any(|found| contains(found, wanted))),
        (state, pattern) => state == pattern,
    }
}

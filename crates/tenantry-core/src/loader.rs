//! Aggregate loader.
//!
//! Produces the minimal `{snapshot?, events[]}` a caller needs to fold into
//! current state, and folds it for read paths that want the state directly.

use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::aggregate::{AggregateType, Fold};
use crate::error::DomainError;
use crate::repository::EventRepository;
use crate::snapshot::SnapshotRepository;

/// Snapshot starting point inside an [`AggregateView`].
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotState {
    /// Event-log version the state reflects.
    pub version: i64,
    /// Folded state document.
    pub state: Value,
}

/// An event to replay on top of the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedEvent {
    /// Version within the aggregate stream.
    pub version: i64,
    /// Namespaced fact tag.
    pub event_type: String,
    /// Fact content.
    pub data: Value,
}

/// Reconstructed aggregate view. Built per request, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateView {
    /// Aggregate identifier.
    pub aggregate_id: Uuid,
    /// Aggregate type the view was filtered to.
    pub aggregate_type: AggregateType,
    /// Highest version reflected by the snapshot and events together.
    pub version: i64,
    /// Optional starting state.
    pub snapshot: Option<SnapshotState>,
    /// Events after the snapshot, ascending.
    pub events: Vec<LoadedEvent>,
}

/// Folded current state of an aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState<S> {
    /// Highest version reflected.
    pub version: i64,
    /// Version of the snapshot replay started from, if any.
    pub snapshot_version: Option<i64>,
    /// Current state.
    pub state: S,
}

/// Loads the snapshot and trailing events of an aggregate.
///
/// Snapshots and events tagged with another aggregate type are ignored, so
/// identities colliding across types cannot leak foreign history into the
/// fold. Returns `None` when neither a snapshot nor events exist.
///
/// # Errors
///
/// Propagates repository errors unmodified.
#[instrument(skip(events, snapshots))]
pub async fn load_aggregate(
    events: &dyn EventRepository,
    snapshots: &dyn SnapshotRepository,
    aggregate_type: AggregateType,
    aggregate_id: Uuid,
) -> Result<Option<AggregateView>, DomainError> {
    let snapshot = snapshots
        .load_latest_snapshot(aggregate_id)
        .await?
        .filter(|s| aggregate_type.matches(&s.aggregate_type))
        .map(|s| SnapshotState {
            version: s.version,
            state: s.state,
        });

    let from_version = snapshot.as_ref().map(|s| s.version + 1);
    let loaded: Vec<LoadedEvent> = events
        .load_stream(aggregate_id, from_version)
        .await?
        .into_iter()
        .filter(|e| aggregate_type.matches(&e.aggregate_type))
        .map(|e| LoadedEvent {
            version: e.version,
            event_type: e.event_type,
            data: e.data,
        })
        .collect();

    if snapshot.is_none() && loaded.is_empty() {
        return Ok(None);
    }

    let highest_event_version = loaded.last().map_or(0, |e| e.version);
    let version = highest_event_version.max(snapshot.as_ref().map_or(0, |s| s.version));

    tracing::debug!(
        version,
        snapshot_version = snapshot.as_ref().map(|s| s.version),
        replayed = loaded.len(),
        "aggregate loaded"
    );

    Ok(Some(AggregateView {
        aggregate_id,
        aggregate_type,
        version,
        snapshot,
        events: loaded,
    }))
}

/// Folds a view into state: starts from the snapshot state if present and
/// applies each event in ascending version order.
///
/// # Errors
///
/// Returns `DomainError::DataIntegrity` if the view belongs to another
/// aggregate type, the snapshot does not deserialize, an event cannot be
/// decoded or legally applied, or no state results.
pub fn replay<S: Fold>(view: &AggregateView) -> Result<S, DomainError> {
    if view.aggregate_type != S::AGGREGATE_TYPE {
        return Err(DomainError::DataIntegrity(format!(
            "cannot fold {} history into {} state",
            view.aggregate_type,
            S::AGGREGATE_TYPE
        )));
    }

    let mut state = view
        .snapshot
        .as_ref()
        .map(|s| {
            serde_json::from_value::<S>(s.state.clone()).map_err(|e| {
                DomainError::DataIntegrity(format!(
                    "snapshot {} of aggregate {} does not deserialize: {e}",
                    s.version, view.aggregate_id
                ))
            })
        })
        .transpose()?;

    for event in &view.events {
        let fact = S::decode(&event.event_type, &event.data)?;
        state = Some(S::fold(state, fact).map_err(|e| match e {
            DomainError::DataIntegrity(msg) => DomainError::DataIntegrity(format!(
                "aggregate {} version {}: {msg}",
                view.aggregate_id, event.version
            )),
            other => other,
        })?);
    }

    state.ok_or_else(|| {
        DomainError::DataIntegrity(format!(
            "aggregate {} has no state to fold",
            view.aggregate_id
        ))
    })
}

/// Loads and folds an aggregate's current state. Returns `None` if the
/// aggregate does not exist.
///
/// # Errors
///
/// Propagates repository errors and fold errors from [`replay`].
pub async fn load_state<S: Fold>(
    events: &dyn EventRepository,
    snapshots: &dyn SnapshotRepository,
    aggregate_id: Uuid,
) -> Result<Option<LoadedState<S>>, DomainError> {
    let Some(view) = load_aggregate(events, snapshots, S::AGGREGATE_TYPE, aggregate_id).await?
    else {
        return Ok(None);
    };
    let state = replay::<S>(&view)?;
    Ok(Some(LoadedState {
        version: view.version,
        snapshot_version: view.snapshot.as_ref().map(|s| s.version),
        state,
    }))
}

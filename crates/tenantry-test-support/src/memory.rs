//! In-memory event log and snapshot store.
//!
//! Implements both repository traits with the same semantics as the
//! PostgreSQL store: the append planning step is shared, and a single mutex
//! stands in for the transaction so a read-check-insert is atomic.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tenantry_core::aggregate::AggregateType;
use tenantry_core::error::DomainError;
use tenantry_core::repository::{
    EventRepository, NewEvent, StoredEvent, batch_aggregate_id, plan_append,
};
use tenantry_core::snapshot::{NewSnapshot, SnapshotRepository, StoredSnapshot, state_contains};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    events: Vec<StoredEvent>,
    snapshots: BTreeMap<(Uuid, i64), StoredSnapshot>,
}

/// Thread-safe in-memory store for unit tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    failing_snapshot_writes: AtomicBool,
    failing_snapshot_scans: AtomicBool,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `persist_snapshot` fail with
    /// `DomainError::StorageUnavailable` (or succeed again when `false`).
    pub fn set_snapshot_writes_failing(&self, failing: bool) {
        self.failing_snapshot_writes.store(failing, Ordering::SeqCst);
    }

    /// Makes every subsequent `find_latest_snapshots_matching` fail with
    /// `DomainError::StorageUnavailable` (or succeed again when `false`).
    pub fn set_snapshot_scans_failing(&self, failing: bool) {
        self.failing_snapshot_scans.store(failing, Ordering::SeqCst);
    }

    /// Returns every stored event of the aggregate in version order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events_of(&self, aggregate_id: Uuid) -> Vec<StoredEvent> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<StoredEvent> = inner
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        events
    }

    /// Returns every stored snapshot of the aggregate in version order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn snapshots_of(&self, aggregate_id: Uuid) -> Vec<StoredSnapshot> {
        self.inner
            .lock()
            .unwrap()
            .snapshots
            .range((aggregate_id, i64::MIN)..=(aggregate_id, i64::MAX))
            .map(|(_, s)| s.clone())
            .collect()
    }
}

#[async_trait]
impl EventRepository for InMemoryStore {
    async fn append(
        &self,
        events: &[NewEvent],
        expected_version: Option<i64>,
    ) -> Result<(), DomainError> {
        let Some(aggregate_id) = batch_aggregate_id(events)? else {
            return Ok(());
        };

        let mut inner = self.inner.lock().unwrap();
        let current = inner
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(0);
        let versions = plan_append(aggregate_id, events, current, expected_version)?;

        inner.events.extend(
            events
                .iter()
                .zip(versions)
                .map(|(event, version)| StoredEvent::from_new(event, version)),
        );
        Ok(())
    }

    async fn load_stream(
        &self,
        aggregate_id: Uuid,
        from_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let from = from_version.unwrap_or(1);
        Ok(self
            .events_of(aggregate_id)
            .into_iter()
            .filter(|e| e.version >= from)
            .collect())
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryStore {
    async fn persist_snapshot(&self, snapshot: NewSnapshot) -> Result<(), DomainError> {
        if self.failing_snapshot_writes.load(Ordering::SeqCst) {
            return Err(DomainError::StorageUnavailable(
                "snapshot table unreachable".into(),
            ));
        }
        self.inner.lock().unwrap().snapshots.insert(
            (snapshot.aggregate_id, snapshot.version),
            StoredSnapshot::from_new(&snapshot),
        );
        Ok(())
    }

    async fn load_latest_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<StoredSnapshot>, DomainError> {
        Ok(self.snapshots_of(aggregate_id).pop())
    }

    async fn find_latest_snapshots_matching(
        &self,
        aggregate_type: AggregateType,
        patterns: &[Value],
    ) -> Result<Vec<StoredSnapshot>, DomainError> {
        if self.failing_snapshot_scans.load(Ordering::SeqCst) {
            return Err(DomainError::StorageUnavailable(
                "snapshot scan timed out".into(),
            ));
        }
        let inner = self.inner.lock().unwrap();
        // BTreeMap order is (aggregate_id, version), so the last write per
        // aggregate wins.
        let mut latest: BTreeMap<Uuid, &StoredSnapshot> = BTreeMap::new();
        for snapshot in inner
            .snapshots
            .values()
            .filter(|s| aggregate_type.matches(&s.aggregate_type))
        {
            latest.insert(snapshot.aggregate_id, snapshot);
        }
        Ok(latest
            .into_values()
            .filter(|s| patterns.iter().any(|p| state_contains(&s.state, p)))
            .cloned()
            .collect())
    }

    async fn prune_snapshots(
        &self,
        aggregate_id: Uuid,
        below_version: i64,
    ) -> Result<u64, DomainError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.snapshots.len();
        inner
            .snapshots
            .retain(|(id, version), _| *id != aggregate_id || *version >= below_version);
        Ok(u64::try_from(before - inner.snapshots.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn new_event(aggregate_id: Uuid, version: Option<i64>) -> NewEvent {
        NewEvent {
            event_id: Uuid::new_v4(),
            tenant_id: aggregate_id,
            aggregate_id,
            aggregate_type: AggregateType::Organization,
            version,
            event_type: "identity.organization.renamed".to_owned(),
            data: json!({"name": "Acme"}),
            meta: json!({}),
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    fn new_snapshot(aggregate_id: Uuid, version: i64, state: Value) -> NewSnapshot {
        NewSnapshot {
            aggregate_id,
            aggregate_type: AggregateType::User,
            version,
            state,
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_appends_form_contiguous_versions() {
        // Arrange
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();

        // Act
        store.append(&[new_event(id, None)], None).await.unwrap();
        store
            .append(&[new_event(id, None), new_event(id, None)], Some(1))
            .await
            .unwrap();
        store.append(&[new_event(id, Some(4))], Some(3)).await.unwrap();

        // Assert
        let versions: Vec<i64> = store
            .load_stream(id, None)
            .await
            .unwrap()
            .iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_stale_expected_version_leaves_log_unchanged() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        store
            .append(&[new_event(id, None), new_event(id, None)], Some(0))
            .await
            .unwrap();

        let result = store
            .append(&[new_event(id, None), new_event(id, None)], Some(1))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert_eq!(store.events_of(id).len(), 2);
    }

    #[tokio::test]
    async fn test_load_stream_from_version_is_inclusive() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        store
            .append(
                &[new_event(id, None), new_event(id, None), new_event(id, None)],
                Some(0),
            )
            .await
            .unwrap();

        let events = store.load_stream(id, Some(2)).await.unwrap();

        let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_with_same_expected_version_admit_one_writer() {
        // Arrange
        let store = Arc::new(InMemoryStore::new());
        let id = Uuid::new_v4();

        // Act
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.append(&[new_event(id, None)], Some(0)).await })
            })
            .collect();
        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(DomainError::ConcurrencyConflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        // Assert
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.events_of(id).len(), 1);
    }

    #[tokio::test]
    async fn test_persist_snapshot_same_version_overwrites() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();

        store
            .persist_snapshot(new_snapshot(id, 1, json!({"name": "old"})))
            .await
            .unwrap();
        store
            .persist_snapshot(new_snapshot(id, 1, json!({"name": "new"})))
            .await
            .unwrap();

        let snapshots = store.snapshots_of(id);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].state, json!({"name": "new"}));
    }

    #[tokio::test]
    async fn test_load_latest_snapshot_returns_highest_version() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        for version in [3, 1, 2] {
            store
                .persist_snapshot(new_snapshot(id, version, json!({ "v": version })))
                .await
                .unwrap();
        }

        let latest = store.load_latest_snapshot(id).await.unwrap().unwrap();

        assert_eq!(latest.version, 3);
    }

    #[tokio::test]
    async fn test_find_latest_snapshots_matching_only_considers_latest_version() {
        // Arrange
        let store = InMemoryStore::new();
        let moved = Uuid::new_v4();
        let stayed = Uuid::new_v4();
        store
            .persist_snapshot(new_snapshot(moved, 1, json!({"org": "a"})))
            .await
            .unwrap();
        store
            .persist_snapshot(new_snapshot(moved, 2, json!({"org": "b"})))
            .await
            .unwrap();
        store
            .persist_snapshot(new_snapshot(stayed, 1, json!({"org": "a"})))
            .await
            .unwrap();

        // Act
        let found = store
            .find_latest_snapshots_matching(AggregateType::User, &[json!({"org": "a"})])
            .await
            .unwrap();

        // Assert
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].aggregate_id, stayed);
    }

    #[tokio::test]
    async fn test_prune_snapshots_keeps_versions_at_or_above_bound() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        for version in 1..=4 {
            store
                .persist_snapshot(new_snapshot(id, version, json!({})))
                .await
                .unwrap();
        }

        let removed = store.prune_snapshots(id, 3).await.unwrap();

        assert_eq!(removed, 2);
        let versions: Vec<i64> = store.snapshots_of(id).iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_failing_snapshot_writes_surface_storage_error() {
        let store = InMemoryStore::new();
        store.set_snapshot_writes_failing(true);

        let result = store
            .persist_snapshot(new_snapshot(Uuid::new_v4(), 1, json!({})))
            .await;

        assert!(matches!(result, Err(DomainError::StorageUnavailable(_))));
    }
}

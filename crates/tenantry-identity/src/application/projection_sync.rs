//! Projection sync: refreshes the organization copies embedded in user
//! snapshots after an organization is renamed.
//!
//! Runs after the rename is committed and outside its transaction. It never
//! fails the caller: every problem is logged and collected in the report,
//! and the read path re-hydrates organization fields anyway.

use serde_json::json;
use tenantry_core::aggregate::AggregateType;
use tenantry_core::clock::Clock;
use tenantry_core::error::DomainError;
use tenantry_core::snapshot::{NewSnapshot, SnapshotRepository, StoredSnapshot};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{OrganizationRef, UserState};

/// A user snapshot that could not be refreshed, or a scan that could not run
/// (`aggregate_id` is `None`).
#[derive(Debug)]
pub struct ProjectionSyncFailure {
    /// The user whose snapshot was not refreshed.
    pub aggregate_id: Option<Uuid>,
    /// What went wrong.
    pub error: DomainError,
}

/// Outcome of one projection sync run.
#[derive(Debug, Default)]
pub struct ProjectionSyncReport {
    /// Latest user snapshots embedding the organization.
    pub scanned: usize,
    /// Users that received a new snapshot version.
    pub updated: Vec<Uuid>,
    /// Users whose snapshot was already current.
    pub skipped: usize,
    /// Problems encountered along the way.
    pub failures: Vec<ProjectionSyncFailure>,
}

impl ProjectionSyncReport {
    /// Returns `true` if every embedding snapshot is now current.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Containment patterns matching a user state that embeds the organization
/// as default, as preferred, or in any membership.
fn embedding_patterns(organization_id: Uuid) -> [serde_json::Value; 3] {
    [
        json!({"default_organization": {"organization_id": organization_id}}),
        json!({"preferred_organization": {"organization_id": organization_id}}),
        json!({"memberships": [{"organization": {"organization_id": organization_id}}]}),
    ]
}

/// Writes `organization`'s current name and short code into every latest
/// user snapshot that embeds it, each as a new snapshot version.
#[instrument(skip(organization, snapshots, clock), fields(organization_id = %organization.organization_id))]
pub async fn sync_organization_into_user_snapshots(
    organization: &OrganizationRef,
    snapshots: &dyn SnapshotRepository,
    clock: &dyn Clock,
) -> ProjectionSyncReport {
    let mut report = ProjectionSyncReport::default();

    let candidates = match snapshots
        .find_latest_snapshots_matching(
            AggregateType::User,
            &embedding_patterns(organization.organization_id),
        )
        .await
    {
        Ok(candidates) => candidates,
        Err(error) => {
            warn!(%error, "could not scan user snapshots");
            report.failures.push(ProjectionSyncFailure {
                aggregate_id: None,
                error,
            });
            return report;
        }
    };
    report.scanned = candidates.len();

    for snapshot in candidates {
        let aggregate_id = snapshot.aggregate_id;
        match refresh_snapshot(snapshot, organization, snapshots, clock).await {
            Ok(true) => report.updated.push(aggregate_id),
            Ok(false) => report.skipped += 1,
            Err(error) => {
                warn!(%aggregate_id, %error, "could not refresh user snapshot");
                report.failures.push(ProjectionSyncFailure {
                    aggregate_id: Some(aggregate_id),
                    error,
                });
            }
        }
    }

    info!(
        scanned = report.scanned,
        updated = report.updated.len(),
        skipped = report.skipped,
        failed = report.failures.len(),
        "projection sync finished"
    );
    report
}

async fn refresh_snapshot(
    snapshot: StoredSnapshot,
    organization: &OrganizationRef,
    snapshots: &dyn SnapshotRepository,
    clock: &dyn Clock,
) -> Result<bool, DomainError> {
    let mut state: UserState = serde_json::from_value(snapshot.state).map_err(|e| {
        DomainError::DataIntegrity(format!(
            "snapshot {} of user {} does not deserialize: {e}",
            snapshot.version, snapshot.aggregate_id
        ))
    })?;
    if !state.refresh_organization(organization) {
        return Ok(false);
    }

    let now = clock.now();
    state.updated_at = now;
    let state = serde_json::to_value(&state)
        .map_err(|e| DomainError::DataIntegrity(format!("user state does not serialize: {e}")))?;
    snapshots
        .persist_snapshot(NewSnapshot {
            aggregate_id: snapshot.aggregate_id,
            aggregate_type: AggregateType::User,
            version: snapshot.version + 1,
            state,
            created_at: now,
        })
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tenantry_test_support::{FixedClock, InMemoryStore};

    use super::*;
    use crate::domain::aggregates::{Membership, Role, UserProfile};

    fn org_ref(id: Uuid, name: &str, short_code: &str) -> OrganizationRef {
        OrganizationRef {
            organization_id: id,
            name: name.to_owned(),
            short_code: short_code.to_owned(),
        }
    }

    fn user_state(default: &OrganizationRef, memberships: &[OrganizationRef]) -> UserState {
        UserState {
            user: UserProfile {
                user_id: Uuid::new_v4(),
                username: "ada".to_owned(),
                email: "ada@example.com".to_owned(),
            },
            default_organization: default.clone(),
            preferred_organization: default.clone(),
            memberships: memberships
                .iter()
                .map(|organization| Membership {
                    organization: organization.clone(),
                    role: Role::Member,
                })
                .collect(),
            is_contributor: false,
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    async fn seed(store: &InMemoryStore, user_id: Uuid, version: i64, state: &UserState) {
        store
            .persist_snapshot(NewSnapshot {
                aggregate_id: user_id,
                aggregate_type: AggregateType::User,
                version,
                state: serde_json::to_value(state).unwrap(),
                created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_writes_next_version_and_keeps_previous() {
        // Arrange
        let store = InMemoryStore::new();
        let clock = FixedClock::standard();
        let org = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let before = user_state(&org_ref(org, "Acme", "ACM"), &[]);
        seed(&store, user_id, 3, &before).await;
        let renamed = org_ref(org, "Acme Labs", "ACL");

        // Act
        let report = sync_organization_into_user_snapshots(&renamed, &store, &clock).await;

        // Assert
        assert!(report.is_complete());
        assert_eq!(report.updated, vec![user_id]);
        let snapshots = store.snapshots_of(user_id);
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].version, 3);
        assert_eq!(snapshots[0].state, serde_json::to_value(&before).unwrap());
        assert_eq!(snapshots[1].version, 4);
        let after: UserState = serde_json::from_value(snapshots[1].state.clone()).unwrap();
        assert_eq!(after.default_organization, renamed);
        assert_eq!(after.preferred_organization, renamed);
        assert_eq!(after.updated_at, clock.0);
        assert_eq!(after.user, before.user);
    }

    #[tokio::test]
    async fn test_sync_refreshes_membership_only_embeddings() {
        let store = InMemoryStore::new();
        let org = Uuid::new_v4();
        let home = org_ref(Uuid::new_v4(), "Home", "HOM");
        let user_id = Uuid::new_v4();
        seed(
            &store,
            user_id,
            1,
            &user_state(&home, &[home.clone(), org_ref(org, "Acme", "ACM")]),
        )
        .await;
        let renamed = org_ref(org, "Acme Labs", "ACL");

        let report =
            sync_organization_into_user_snapshots(&renamed, &store, &FixedClock::standard()).await;

        assert_eq!(report.updated, vec![user_id]);
        let latest: UserState =
            serde_json::from_value(store.snapshots_of(user_id)[1].state.clone()).unwrap();
        assert_eq!(latest.default_organization, home);
        assert_eq!(latest.memberships[0].organization, home);
        assert_eq!(latest.memberships[1].organization, renamed);
    }

    #[tokio::test]
    async fn test_sync_ignores_users_not_embedding_organization() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        seed(
            &store,
            user_id,
            1,
            &user_state(&org_ref(Uuid::new_v4(), "Other", "OTH"), &[]),
        )
        .await;

        let report = sync_organization_into_user_snapshots(
            &org_ref(Uuid::new_v4(), "Acme", "ACM"),
            &store,
            &FixedClock::standard(),
        )
        .await;

        assert_eq!(report.scanned, 0);
        assert_eq!(store.snapshots_of(user_id).len(), 1);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        // Arrange
        let store = InMemoryStore::new();
        let clock = FixedClock::standard();
        let org = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        seed(&store, user_id, 1, &user_state(&org_ref(org, "Acme", "ACM"), &[])).await;
        let renamed = org_ref(org, "Acme Labs", "ACL");

        // Act
        sync_organization_into_user_snapshots(&renamed, &store, &clock).await;
        let second = sync_organization_into_user_snapshots(&renamed, &store, &clock).await;

        // Assert
        assert!(second.updated.is_empty());
        assert_eq!(second.skipped, 1);
        assert_eq!(store.snapshots_of(user_id).len(), 2);
    }

    #[tokio::test]
    async fn test_sync_collects_write_failures_without_erroring() {
        let store = InMemoryStore::new();
        let org = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        seed(&store, user_id, 1, &user_state(&org_ref(org, "Acme", "ACM"), &[])).await;
        store.set_snapshot_writes_failing(true);

        let report = sync_organization_into_user_snapshots(
            &org_ref(org, "Acme Labs", "ACL"),
            &store,
            &FixedClock::standard(),
        )
        .await;

        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].aggregate_id, Some(user_id));
        assert!(matches!(
            report.failures[0].error,
            DomainError::StorageUnavailable(_)
        ));
        assert_eq!(store.snapshots_of(user_id).len(), 1);
    }

    #[tokio::test]
    async fn test_sync_reports_undecodable_snapshot_and_continues() {
        // Arrange
        let store = InMemoryStore::new();
        let org = Uuid::new_v4();
        let broken = Uuid::new_v4();
        let healthy = Uuid::new_v4();
        store
            .persist_snapshot(NewSnapshot {
                aggregate_id: broken,
                aggregate_type: AggregateType::User,
                version: 1,
                state: json!({"default_organization": {"organization_id": org}}),
                created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            })
            .await
            .unwrap();
        seed(&store, healthy, 1, &user_state(&org_ref(org, "Acme", "ACM"), &[])).await;

        // Act
        let report = sync_organization_into_user_snapshots(
            &org_ref(org, "Acme Labs", "ACL"),
            &store,
            &FixedClock::standard(),
        )
        .await;

        // Assert
        assert_eq!(report.scanned, 2);
        assert_eq!(report.updated, vec![healthy]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].aggregate_id, Some(broken));
        assert!(matches!(
            report.failures[0].error,
            DomainError::DataIntegrity(_)
        ));
    }

    #[tokio::test]
    async fn test_sync_reports_scan_failure_without_touching_snapshots() {
        // Arrange
        let store = InMemoryStore::new();
        let org = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        seed(&store, user_id, 1, &user_state(&org_ref(org, "Acme", "ACM"), &[])).await;
        store.set_snapshot_scans_failing(true);

        // Act
        let report = sync_organization_into_user_snapshots(
            &org_ref(org, "Acme Labs", "ACL"),
            &store,
            &FixedClock::standard(),
        )
        .await;

        // Assert
        assert!(!report.is_complete());
        assert_eq!(report.scanned, 0);
        assert!(report.updated.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].aggregate_id, None);
        assert!(matches!(
            report.failures[0].error,
            DomainError::StorageUnavailable(_)
        ));
        assert_eq!(store.snapshots_of(user_id).len(), 1);
    }
}

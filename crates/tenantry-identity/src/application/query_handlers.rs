//! Query handlers for the identity context.
//!
//! Reads fold aggregates through the loader and return view DTOs. User
//! views re-hydrate the embedded organization copies from the organization
//! aggregates, so they are current even when a projection sync failed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tenantry_core::aggregate::AggregateType;
use tenantry_core::error::DomainError;
use tenantry_core::loader::load_state;
use tenantry_core::repository::EventRepository;
use tenantry_core::snapshot::SnapshotRepository;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Membership, OrganizationRef, OrganizationState, UserProfile, UserState};

/// Read-only view of an organization.
#[derive(Debug, Serialize)]
pub struct OrganizationView {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// Current display name.
    pub name: String,
    /// Current short code.
    pub short_code: String,
    /// The owning user.
    pub owner_id: Uuid,
    /// Current version, for use as the next `expected_version`.
    pub version: i64,
}

/// Read-only view of a user with current organization fields.
#[derive(Debug, Serialize)]
pub struct UserView {
    /// Identity of the user.
    pub user: UserProfile,
    /// Organization the user registered into.
    pub default_organization: OrganizationRef,
    /// Organization the user currently works in.
    pub preferred_organization: OrganizationRef,
    /// All memberships.
    pub memberships: Vec<Membership>,
    /// Whether the user may contribute content.
    pub is_contributor: bool,
    /// Last time the user state changed.
    pub updated_at: DateTime<Utc>,
    /// Current version of the user aggregate.
    pub version: i64,
}

/// Retrieves an organization by its aggregate ID.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if neither events nor a snapshot
/// exist for the ID, and `DomainError::DataIntegrity` if its history cannot
/// be folded.
#[instrument(skip(events, snapshots))]
pub async fn get_organization_by_id(
    organization_id: Uuid,
    events: &dyn EventRepository,
    snapshots: &dyn SnapshotRepository,
) -> Result<OrganizationView, DomainError> {
    let loaded = load_state::<OrganizationState>(events, snapshots, organization_id)
        .await?
        .ok_or(DomainError::AggregateNotFound(organization_id))?;
    Ok(OrganizationView {
        organization_id: loaded.state.organization_id,
        name: loaded.state.name,
        short_code: loaded.state.short_code,
        owner_id: loaded.state.owner_id,
        version: loaded.version,
    })
}

/// Retrieves a user by ID with every embedded organization replaced by the
/// organization's current fields. An organization that cannot be found or
/// loaded keeps its embedded copy.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the user does not exist and
/// propagates load and fold errors for the user itself.
#[instrument(skip(events, snapshots))]
pub async fn get_user_with_current_organizations(
    user_id: Uuid,
    events: &dyn EventRepository,
    snapshots: &dyn SnapshotRepository,
) -> Result<UserView, DomainError> {
    let loaded = load_state::<UserState>(events, snapshots, user_id)
        .await?
        .ok_or(DomainError::AggregateNotFound(user_id))?;
    let mut state = loaded.state;

    let mut current: HashMap<Uuid, OrganizationRef> = HashMap::new();
    for organization_id in state.organization_ids() {
        match load_state::<OrganizationState>(events, snapshots, organization_id).await {
            Ok(Some(organization)) => {
                current.insert(organization_id, organization.state.to_ref());
            }
            Ok(None) => warn!(%organization_id, "embedded organization not found, keeping copy"),
            Err(error) => {
                warn!(%organization_id, %error, "embedded organization does not load, keeping copy");
            }
        }
    }
    for organization in current.values() {
        state.refresh_organization(organization);
    }

    Ok(UserView {
        user: state.user,
        default_organization: state.default_organization,
        preferred_organization: state.preferred_organization,
        memberships: state.memberships,
        is_contributor: state.is_contributor,
        updated_at: state.updated_at,
        version: loaded.version,
    })
}

/// Finds a user by username or email. The identifier is trimmed; the email
/// comparison is case-insensitive. Returns `None` when no user matches.
///
/// Lookup runs over the latest user snapshots; the match is then loaded and
/// hydrated like [`get_user_with_current_organizations`].
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank identifier and propagates
/// storage and fold errors.
#[instrument(skip(events, snapshots))]
pub async fn find_user_by_identifier(
    identifier: &str,
    events: &dyn EventRepository,
    snapshots: &dyn SnapshotRepository,
) -> Result<Option<UserView>, DomainError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation("identifier must not be blank".into()));
    }
    let patterns = [
        json!({"user": {"username": trimmed}}),
        json!({"user": {"email": trimmed.to_lowercase()}}),
    ];
    let matches = snapshots
        .find_latest_snapshots_matching(AggregateType::User, &patterns)
        .await?;
    let Some(found) = matches.first() else {
        return Ok(None);
    };
    if matches.len() > 1 {
        warn!(count = matches.len(), "identifier matches several users, using the first");
    }

    get_user_with_current_organizations(found.aggregate_id, events, snapshots)
        .await
        .map(Some)
}

//! Command handlers for the identity context.
//!
//! Each handler loads what it needs through the aggregate loader, records new
//! facts on the aggregate, appends them with an expected version, and then
//! writes a snapshot. Snapshot writes happen after the commit and are
//! best-effort: a failure is logged and reported, never returned.

use serde::Serialize;
use tenantry_core::aggregate::{AggregateRoot, AggregateType};
use tenantry_core::error::DomainError;
use tenantry_core::event::DomainEvent;
use tenantry_core::loader::load_state;
use tenantry_core::repository::NewEvent;
use tenantry_core::snapshot::{NewSnapshot, SnapshotPolicy};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::HandlerContext;
use crate::application::projection_sync::{
    ProjectionSyncReport, sync_organization_into_user_snapshots,
};
use crate::domain::aggregates::{Organization, OrganizationState, User};
use crate::domain::commands::{CreateOrganization, RegisterUser, RenameOrganization};

/// Result of a committed command.
#[derive(Debug)]
pub struct CommandOutcome {
    /// The aggregate the facts were appended to.
    pub aggregate_id: Uuid,
    /// Version of the aggregate after the commit.
    pub version: i64,
    /// The facts as appended.
    pub events: Vec<NewEvent>,
    /// Version of the snapshot written after the commit, if any.
    pub snapshot_version: Option<i64>,
}

/// Result of a committed rename, including the follow-up projection sync.
#[derive(Debug)]
pub struct RenameOutcome {
    /// The committed rename.
    pub outcome: CommandOutcome,
    /// What the projection sync did with user snapshots.
    pub projection: ProjectionSyncReport,
}

async fn commit<A: AggregateRoot>(
    ctx: &HandlerContext<'_>,
    aggregate: &mut A,
) -> Result<Vec<NewEvent>, DomainError> {
    let events: Vec<NewEvent> = aggregate
        .uncommitted_events()
        .iter()
        .map(|event| event.to_new_event())
        .collect();
    ctx.events.append(&events, Some(aggregate.version())).await?;
    aggregate.clear_uncommitted_events();
    Ok(events)
}

/// Writes a snapshot of `state` at `version` if `policy` says one is due.
/// Returns the snapshot version when one was written.
async fn snapshot_if_due<S: Serialize>(
    ctx: &HandlerContext<'_>,
    policy: SnapshotPolicy,
    aggregate_type: AggregateType,
    aggregate_id: Uuid,
    version: i64,
    last_snapshot_version: Option<i64>,
    state: &S,
) -> Option<i64> {
    if !policy.should_snapshot(version, last_snapshot_version) {
        return None;
    }
    let state = match serde_json::to_value(state) {
        Ok(state) => state,
        Err(error) => {
            warn!(%aggregate_id, version, %error, "state does not serialize, snapshot skipped");
            return None;
        }
    };
    let snapshot = NewSnapshot {
        aggregate_id,
        aggregate_type,
        version,
        state,
        created_at: ctx.clock.now(),
    };
    match ctx.snapshots.persist_snapshot(snapshot).await {
        Ok(()) => Some(version),
        Err(error) => {
            warn!(%aggregate_id, version, %error, "snapshot write failed");
            None
        }
    }
}

/// Handles the `CreateOrganization` command: founds the organization at
/// version 1 and snapshots it per policy.
///
/// # Errors
///
/// Returns `DomainError::Validation` for blank fields and propagates append
/// failures.
#[instrument(skip(command, ctx), fields(correlation_id = %command.correlation_id))]
pub async fn handle_create_organization(
    command: &CreateOrganization,
    ctx: &HandlerContext<'_>,
) -> Result<CommandOutcome, DomainError> {
    let organization_id = ctx.ids.next_id();
    let mut organization = Organization::create(
        organization_id,
        &command.name,
        &command.short_code,
        command.owner_id,
        command.created_by,
        command.correlation_id,
        ctx.ids,
        ctx.clock,
    )?;

    let events = commit(ctx, &mut organization).await?;
    let version = organization.version();
    let snapshot_version = match organization.state() {
        Some(state) => {
            snapshot_if_due(
                ctx,
                ctx.snapshot_policy,
                AggregateType::Organization,
                organization_id,
                version,
                None,
                state,
            )
            .await
        }
        None => None,
    };

    info!(%organization_id, "organization created");
    Ok(CommandOutcome {
        aggregate_id: organization_id,
        version,
        events,
        snapshot_version,
    })
}

/// Handles the `RenameOrganization` command: checks the caller's expected
/// version against the loaded one, appends the rename, snapshots per policy,
/// and refreshes the user snapshots embedding the organization.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the organization does not
/// exist, `DomainError::ConcurrencyConflict` if `expected_version` is stale
/// either at load or at append, and `DomainError::Validation` for blank
/// fields. Projection sync problems are reported, never returned.
#[instrument(skip(command, ctx), fields(organization_id = %command.organization_id, correlation_id = %command.correlation_id))]
pub async fn handle_rename_organization(
    command: &RenameOrganization,
    ctx: &HandlerContext<'_>,
) -> Result<RenameOutcome, DomainError> {
    let loaded = load_state::<OrganizationState>(ctx.events, ctx.snapshots, command.organization_id)
        .await?
        .ok_or(DomainError::AggregateNotFound(command.organization_id))?;
    if loaded.version != command.expected_version {
        return Err(DomainError::ConcurrencyConflict {
            aggregate_id: command.organization_id,
            expected: command.expected_version,
            actual: loaded.version,
        });
    }

    let mut organization = Organization::from_state(loaded.state, loaded.version);
    organization.rename(
        &command.name,
        &command.short_code,
        command.renamed_by,
        command.correlation_id,
        command.session_id.clone(),
        ctx.ids,
        ctx.clock,
    )?;

    let events = commit(ctx, &mut organization).await?;
    let version = organization.version();
    let Some(state) = organization.state() else {
        return Err(DomainError::AggregateNotFound(command.organization_id));
    };
    let snapshot_version = snapshot_if_due(
        ctx,
        ctx.snapshot_policy,
        AggregateType::Organization,
        command.organization_id,
        version,
        loaded.snapshot_version,
        state,
    )
    .await;

    info!(version, "organization renamed");

    // A later rename may have committed meanwhile; sync whatever is current.
    let current = match load_state::<OrganizationState>(
        ctx.events,
        ctx.snapshots,
        command.organization_id,
    )
    .await
    {
        Ok(Some(latest)) if latest.version >= version => latest.state.to_ref(),
        Ok(_) => state.to_ref(),
        Err(error) => {
            warn!(%error, "could not re-read organization, syncing committed fields");
            state.to_ref()
        }
    };
    let projection = sync_organization_into_user_snapshots(&current, ctx.snapshots, ctx.clock).await;

    Ok(RenameOutcome {
        outcome: CommandOutcome {
            aggregate_id: command.organization_id,
            version,
            events,
            snapshot_version,
        },
        projection,
    })
}

/// Handles the `RegisterUser` command: embeds the default organization's
/// current fields, appends the registration at version 1, and always writes
/// the user snapshot, since lookups by username or email read snapshots.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the default organization does not
/// exist or the username or email is malformed, and propagates load and
/// append failures.
#[instrument(skip(command, ctx), fields(correlation_id = %command.correlation_id))]
pub async fn handle_register_user(
    command: &RegisterUser,
    ctx: &HandlerContext<'_>,
) -> Result<CommandOutcome, DomainError> {
    let organization = load_state::<OrganizationState>(
        ctx.events,
        ctx.snapshots,
        command.default_organization_id,
    )
    .await?
    .ok_or_else(|| {
        DomainError::Validation(format!(
            "default organization {} does not exist",
            command.default_organization_id
        ))
    })?;

    let user_id = ctx.ids.next_id();
    let mut user = User::register(
        user_id,
        &command.username,
        &command.email,
        organization.state.to_ref(),
        command.role,
        command.is_contributor,
        command.correlation_id,
        ctx.ids,
        ctx.clock,
    )?;

    let events = commit(ctx, &mut user).await?;
    let version = user.version();
    let snapshot_version = match user.state() {
        Some(state) => {
            snapshot_if_due(
                ctx,
                SnapshotPolicy::Always,
                AggregateType::User,
                user_id,
                version,
                None,
                state,
            )
            .await
        }
        None => None,
    };

    info!(%user_id, "user registered");
    Ok(CommandOutcome {
        aggregate_id: user_id,
        version,
        events,
        snapshot_version,
    })
}

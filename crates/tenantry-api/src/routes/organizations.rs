//! Routes for organizations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tenantry_identity::application::command_handlers::{self, CommandOutcome};
use tenantry_identity::application::projection_sync::ProjectionSyncReport;
use tenantry_identity::application::query_handlers::{self, OrganizationView};
use tenantry_identity::domain::commands;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    /// Display name.
    pub name: String,
    /// Short code.
    pub short_code: String,
    /// The owning user.
    pub owner_id: Uuid,
    /// The acting user; defaults to the owner.
    pub created_by: Option<Uuid>,
}

/// Request body for POST /{id}/rename.
#[derive(Debug, Deserialize)]
pub struct RenameOrganizationRequest {
    /// New display name.
    pub name: String,
    /// New short code.
    pub short_code: String,
    /// The acting user.
    pub renamed_by: Uuid,
    /// The version the caller last read.
    pub expected_version: i64,
    /// Session the rename was issued from.
    pub session_id: Option<String>,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The aggregate the command applied to.
    pub aggregate_id: Uuid,
    /// Version after the commit.
    pub version: i64,
    /// IDs of the domain events persisted.
    pub event_ids: Vec<Uuid>,
    /// Version of the snapshot taken after the commit, if any.
    pub snapshot_version: Option<i64>,
}

impl From<CommandOutcome> for CommandResponse {
    fn from(outcome: CommandOutcome) -> Self {
        Self {
            aggregate_id: outcome.aggregate_id,
            version: outcome.version,
            event_ids: outcome.events.iter().map(|e| e.event_id).collect(),
            snapshot_version: outcome.snapshot_version,
        }
    }
}

/// Summary of the projection sync run after a rename.
#[derive(Debug, Serialize)]
pub struct ProjectionSummary {
    /// User snapshots embedding the organization.
    pub scanned: usize,
    /// Users given a refreshed snapshot.
    pub updated: Vec<Uuid>,
    /// Users already current.
    pub skipped: usize,
    /// Users that could not be refreshed.
    pub failed: usize,
}

impl From<&ProjectionSyncReport> for ProjectionSummary {
    fn from(report: &ProjectionSyncReport) -> Self {
        Self {
            scanned: report.scanned,
            updated: report.updated.clone(),
            skipped: report.skipped,
            failed: report.failures.len(),
        }
    }
}

/// Response body for POST /{id}/rename.
#[derive(Debug, Serialize)]
pub struct RenameResponse {
    /// The committed rename.
    #[serde(flatten)]
    pub command: CommandResponse,
    /// What happened to the user projections.
    pub projection: ProjectionSummary,
}

/// POST /
#[instrument(skip(state, request), fields(owner_id = %request.owner_id))]
async fn create_organization(
    State(state): State<AppState>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::CreateOrganization {
        correlation_id: Uuid::new_v4(),
        name: request.name,
        short_code: request.short_code,
        owner_id: request.owner_id,
        created_by: request.created_by.unwrap_or(request.owner_id),
    };

    info!(correlation_id = %command.correlation_id, "handling create_organization command");

    let outcome =
        command_handlers::handle_create_organization(&command, &state.handler_context()).await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_organization(
    State(state): State<AppState>,
    Path(organization_id): Path<Uuid>,
) -> Result<Json<OrganizationView>, ApiError> {
    let view = query_handlers::get_organization_by_id(
        organization_id,
        &*state.event_repository,
        &*state.snapshot_repository,
    )
    .await?;
    Ok(Json(view))
}

/// POST /{id}/rename
#[instrument(skip(state, request), fields(expected_version = request.expected_version))]
async fn rename_organization(
    State(state): State<AppState>,
    Path(organization_id): Path<Uuid>,
    Json(request): Json<RenameOrganizationRequest>,
) -> Result<Json<RenameResponse>, ApiError> {
    let command = commands::RenameOrganization {
        correlation_id: Uuid::new_v4(),
        organization_id,
        name: request.name,
        short_code: request.short_code,
        renamed_by: request.renamed_by,
        expected_version: request.expected_version,
        session_id: request.session_id,
    };

    info!(correlation_id = %command.correlation_id, "handling rename_organization command");

    let renamed =
        command_handlers::handle_rename_organization(&command, &state.handler_context()).await?;
    if !renamed.projection.is_complete() {
        warn!(
            failed = renamed.projection.failures.len(),
            "rename committed with stale user projections"
        );
    }

    Ok(Json(RenameResponse {
        projection: ProjectionSummary::from(&renamed.projection),
        command: renamed.outcome.into(),
    }))
}

/// Returns the router for organization endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_organization))
        .route("/{id}", get(get_organization))
        .route("/{id}/rename", post(rename_organization))
}

//! Routes for users.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use tenantry_identity::application::command_handlers;
use tenantry_identity::application::query_handlers::{self, UserView};
use tenantry_identity::domain::aggregates::Role;
use tenantry_identity::domain::commands;

use crate::error::{ApiError, ErrorBody};
use crate::routes::organizations::CommandResponse;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    /// Login name.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Organization the user joins.
    pub default_organization_id: Uuid,
    /// Role in that organization; members by default.
    pub role: Option<Role>,
    /// Whether the user may contribute content.
    #[serde(default)]
    pub is_contributor: bool,
}

/// Query string for GET /lookup.
#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    /// A username or an email address.
    pub identifier: String,
}

/// POST /
#[instrument(skip(state, request), fields(default_organization_id = %request.default_organization_id))]
async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::RegisterUser {
        correlation_id: Uuid::new_v4(),
        username: request.username,
        email: request.email,
        default_organization_id: request.default_organization_id,
        role: request.role.unwrap_or(Role::Member),
        is_contributor: request.is_contributor,
    };

    info!(correlation_id = %command.correlation_id, "handling register_user command");

    let outcome =
        command_handlers::handle_register_user(&command, &state.handler_context()).await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserView>, ApiError> {
    let view = query_handlers::get_user_with_current_organizations(
        user_id,
        &*state.event_repository,
        &*state.snapshot_repository,
    )
    .await?;
    Ok(Json(view))
}

/// GET /lookup?identifier=
#[instrument(skip(state, query))]
async fn lookup_user(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Response, ApiError> {
    let found = query_handlers::find_user_by_identifier(
        &query.identifier,
        &*state.event_repository,
        &*state.snapshot_repository,
    )
    .await?;

    Ok(match found {
        Some(view) => Json(view).into_response(),
        None => ErrorBody {
            error: "user_not_found",
            message: format!("no user matches {:?}", query.identifier.trim()),
        }
        .into_response_with(StatusCode::NOT_FOUND),
    })
}

/// Returns the router for user endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_user))
        .route("/lookup", get(lookup_user))
        .route("/{id}", get(get_user))
}

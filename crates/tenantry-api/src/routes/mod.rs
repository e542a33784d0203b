//! Route modules for the identity context.

pub mod health;
pub mod organizations;
pub mod users;

use axum::Router;

use crate::state::AppState;

/// Returns every route, nested under its public prefix.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/organizations", organizations::router())
        .nest("/api/v1/users", users::router())
}

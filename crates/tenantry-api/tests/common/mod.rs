//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tenantry_core::snapshot::SnapshotPolicy;
use tenantry_event_store::pg_event_repository::PgEventRepository;
use tenantry_event_store::pg_snapshot_repository::PgSnapshotRepository;
use tenantry_test_support::{FixedClock, SequentialIdGenerator};
use tower::ServiceExt;

use tenantry_api::routes;
use tenantry_api::state::AppState;

/// Build the full app router over real PostgreSQL repositories with a
/// deterministic clock and id generator. Uses the same routes as `main.rs`.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_policy(pool, SnapshotPolicy::Always)
}

/// Build the full app router with a custom snapshot policy.
pub fn build_test_app_with_policy(pool: PgPool, snapshot_policy: SnapshotPolicy) -> Router {
    let app_state = AppState::new(
        pool.clone(),
        Arc::new(FixedClock::standard()),
        Arc::new(SequentialIdGenerator::default()),
        Arc::new(PgEventRepository::new(pool.clone())),
        Arc::new(PgSnapshotRepository::new(pool)),
        snapshot_policy,
    );

    routes::api_router().with_state(app_state)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Create an organization and return its id.
pub async fn create_organization(app: &Router, name: &str, short_code: &str) -> String {
    let (status, json) = post_json(
        app.clone(),
        "/api/v1/organizations",
        &serde_json::json!({
            "name": name,
            "short_code": short_code,
            "owner_id": uuid::Uuid::nil(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {json}");
    json["aggregate_id"].as_str().unwrap().to_owned()
}

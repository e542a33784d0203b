//! Integration tests for the organization endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use tenantry_core::snapshot::SnapshotPolicy;
use uuid::Uuid;

fn rename_body(name: &str, short_code: &str, expected_version: i64) -> serde_json::Value {
    json!({
        "name": name,
        "short_code": short_code,
        "renamed_by": Uuid::nil(),
        "expected_version": expected_version,
        "session_id": "session-1",
    })
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_create_organization_persists_event_and_snapshot(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(pool.clone());

    // Act
    let (status, json) = common::post_json(
        app,
        "/api/v1/organizations",
        &json!({ "name": "Acme", "short_code": "ACM", "owner_id": Uuid::nil() }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["version"], 1);
    assert_eq!(json["snapshot_version"], 1);
    let id: Uuid = json["aggregate_id"].as_str().unwrap().parse().unwrap();
    let (event_type,): (String,) =
        sqlx::query_as("SELECT type FROM events WHERE aggregate_id = $1 AND version = 1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(event_type, "identity.organization.created");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rename_then_stale_rename_keeps_first_name(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(pool);
    let id = common::create_organization(&app, "Acme", "ACM").await;
    let uri = format!("/api/v1/organizations/{id}/rename");

    // Act
    let (first, renamed) =
        common::post_json(app.clone(), &uri, &rename_body("Acme Corp", "ACC", 1)).await;
    let (second, conflict) =
        common::post_json(app.clone(), &uri, &rename_body("Acme Inc", "ACI", 1)).await;
    let (_, view) = common::get_json(app, &format!("/api/v1/organizations/{id}")).await;

    // Assert
    assert_eq!(first, StatusCode::OK);
    assert_eq!(renamed["version"], 2);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(conflict["error"], "concurrency_conflict");
    assert_eq!(view["name"], "Acme Corp");
    assert_eq!(view["short_code"], "ACC");
    assert_eq!(view["version"], 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_get_organization_replays_without_snapshots(pool: PgPool) {
    let app = common::build_test_app_with_policy(pool.clone(), SnapshotPolicy::Never);
    let id = common::create_organization(&app, "Acme", "ACM").await;
    common::post_json(
        app.clone(),
        &format!("/api/v1/organizations/{id}/rename"),
        &rename_body("Acme Labs", "ACL", 1),
    )
    .await;

    let (status, view) = common::get_json(app, &format!("/api/v1/organizations/{id}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["name"], "Acme Labs");
    assert_eq!(view["version"], 2);
    let (snapshots,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM snapshots")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(snapshots, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rename_unknown_organization_returns_404(pool: PgPool) {
    let app = common::build_test_app(pool);

    let (status, json) = common::post_json(
        app,
        &format!("/api/v1/organizations/{}/rename", Uuid::new_v4()),
        &rename_body("Acme", "ACM", 1),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "aggregate_not_found");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_get_organization_with_unknown_event_type_returns_500(pool: PgPool) {
    // Arrange
    let app = common::build_test_app_with_policy(pool.clone(), SnapshotPolicy::Never);
    let id = common::create_organization(&app, "Acme", "ACM").await;
    sqlx::query(
        "INSERT INTO events (id, tenant_id, aggregate_id, aggregate_type, version, type, data) \
         VALUES ($1, $2, $2, 'identity.organization', 2, 'identity.organization.archived', '{}')",
    )
    .bind(Uuid::new_v4())
    .bind(id.parse::<Uuid>().unwrap())
    .execute(&pool)
    .await
    .unwrap();

    // Act
    let (status, json) = common::get_json(app, &format!("/api/v1/organizations/{id}")).await;

    // Assert
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "data_integrity_error");
}

//! Tenantry API server entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tenantry_api::config::Config;
use tenantry_api::error::AppError;
use tenantry_api::routes;
use tenantry_api::state::AppState;
use tenantry_core::clock::SystemClock;
use tenantry_core::id::UuidV7Generator;
use tenantry_event_store::pg_event_repository::PgEventRepository;
use tenantry_event_store::pg_snapshot_repository::PgSnapshotRepository;
use tenantry_event_store::schema;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // RUST_LOG wins over LOG_LEVEL.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Tenantry API server");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    schema::run_migrations(&pool).await?;

    let app_state = AppState::new(
        pool.clone(),
        Arc::new(SystemClock),
        Arc::new(UuidV7Generator),
        Arc::new(PgEventRepository::new(pool.clone())),
        Arc::new(PgSnapshotRepository::new(pool)),
        config.snapshot_policy(),
    );

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::api_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = config.listen_addr()?;
    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

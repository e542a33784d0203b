//! Event store database schema.
//!
//! The DDL lives in the workspace `migrations/` directory and is embedded
//! here at compile time.

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};

/// Migrations creating the `events` and `snapshots` tables.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Applies any pending migrations.
///
/// # Errors
///
/// Returns a `MigrateError` if a migration fails or the applied history
/// diverges from the embedded one.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

//! Shared application state.

use std::sync::Arc;

use sqlx::PgPool;
use tenantry_core::clock::Clock;
use tenantry_core::id::IdGenerator;
use tenantry_core::repository::EventRepository;
use tenantry_core::snapshot::{SnapshotPolicy, SnapshotRepository};
use tenantry_identity::application::HandlerContext;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool.
    pub db_pool: PgPool,
    /// Clock for deterministic timestamps.
    pub clock: Arc<dyn Clock>,
    /// Source of event and aggregate identifiers.
    pub ids: Arc<dyn IdGenerator>,
    /// Event log.
    pub event_repository: Arc<dyn EventRepository>,
    /// Snapshot store.
    pub snapshot_repository: Arc<dyn SnapshotRepository>,
    /// When command handlers snapshot after a commit.
    pub snapshot_policy: SnapshotPolicy,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        db_pool: PgPool,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        event_repository: Arc<dyn EventRepository>,
        snapshot_repository: Arc<dyn SnapshotRepository>,
        snapshot_policy: SnapshotPolicy,
    ) -> Self {
        Self {
            db_pool,
            clock,
            ids,
            event_repository,
            snapshot_repository,
            snapshot_policy,
        }
    }

    /// Borrows the ports as a context for one command.
    #[must_use]
    pub fn handler_context(&self) -> HandlerContext<'_> {
        HandlerContext {
            clock: self.clock.as_ref(),
            ids: self.ids.as_ref(),
            events: self.event_repository.as_ref(),
            snapshots: self.snapshot_repository.as_ref(),
            snapshot_policy: self.snapshot_policy,
        }
    }
}

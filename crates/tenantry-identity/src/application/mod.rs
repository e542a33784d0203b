//! Application layer for the identity context.

pub mod command_handlers;
pub mod projection_sync;
pub mod query_handlers;

use tenantry_core::clock::Clock;
use tenantry_core::id::IdGenerator;
use tenantry_core::repository::EventRepository;
use tenantry_core::snapshot::{SnapshotPolicy, SnapshotRepository};

/// Ports a command handler needs, borrowed from the caller for one request.
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    /// Source of fact and snapshot timestamps.
    pub clock: &'a dyn Clock,
    /// Source of event and aggregate identifiers.
    pub ids: &'a dyn IdGenerator,
    /// The event log.
    pub events: &'a dyn EventRepository,
    /// The snapshot store.
    pub snapshots: &'a dyn SnapshotRepository,
    /// When to snapshot organizations after a commit.
    pub snapshot_policy: SnapshotPolicy,
}

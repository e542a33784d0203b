//! Deterministic identifier generation for tests and replays.

use std::sync::atomic::{AtomicU64, Ordering};

use tenantry_core::id::IdGenerator;
use uuid::Uuid;

/// Yields `00000000-0000-0000-0000-000000000001`, `...02`, and so on.
/// Ids are unique and ascending, like the production UUIDv7 generator.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Creates a generator whose first id is `start + 1`.
    #[must_use]
    pub fn starting_after(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> Uuid {
        Uuid::from_u128(u128::from(self.next.fetch_add(1, Ordering::Relaxed)) + 1)
    }
}

//! Identity generation.
//!
//! Event and aggregate identifiers are produced through a port so that
//! tests and replays can inject a deterministic sequence.

use uuid::Uuid;

/// Produces globally unique identifiers.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh identifier. Never returns the same value twice.
    fn next_id(&self) -> Uuid;
}

/// Production generator yielding time-sortable UUIDv7 values.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> Uuid {
        Uuid::now_v7()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_v7_generator_yields_distinct_v7_ids() {
        let ids = UuidV7Generator;

        let first = ids.next_id();
        let second = ids.next_id();

        assert_ne!(first, second);
        assert_eq!(first.get_version_num(), 7);
    }
}

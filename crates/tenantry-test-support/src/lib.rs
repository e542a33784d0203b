//! Shared test doubles for the Tenantry identity platform.

mod clock;
mod ids;
mod memory;
mod repository;

pub use clock::FixedClock;
pub use ids::SequentialIdGenerator;
pub use memory::InMemoryStore;
pub use repository::{EmptyEventRepository, FailingEventRepository, RecordingEventRepository};

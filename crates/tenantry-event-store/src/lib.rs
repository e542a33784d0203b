//! Tenantry Event Store: `PostgreSQL` persistence for the event log and
//! snapshot store.

pub mod error;
pub mod pg_event_repository;
pub mod pg_snapshot_repository;
pub mod schema;

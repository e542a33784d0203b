//! Tenantry identity context.
//!
//! Organizations and users are event-sourced aggregates. Users embed a copy
//! of the organizations they belong to in their snapshots; renaming an
//! organization refreshes those copies through the projection sync.

pub mod application;
pub mod domain;

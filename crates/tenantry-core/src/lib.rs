//! Tenantry Core: event-sourcing abstractions.
//!
//! This crate defines the event log and snapshot store contracts, the
//! aggregate loader that composes them, and the fold trait that aggregate
//! states implement. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod loader;
pub mod repository;
pub mod snapshot;

//! Domain layer for the identity context.

pub mod aggregates;
pub mod commands;
pub mod events;

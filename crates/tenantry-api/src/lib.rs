//! HTTP surface for the Tenantry identity platform.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

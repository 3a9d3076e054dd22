//! Domain layer for the tenant context.

pub mod aggregates;
pub mod commands;
pub mod events;

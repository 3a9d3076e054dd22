//! Application layer for the tenant context.

pub mod command_handlers;
pub mod directory;
pub mod integration;
pub mod query_handlers;

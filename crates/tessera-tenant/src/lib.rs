//! Tessera tenant management bounded context.
//!
//! Owns the lifecycle of tenants: creation, renaming, plan changes,
//! suspension and soft deletion. Every change is published to other contexts
//! as an integration event through the outbox.

pub mod application;
pub mod domain;

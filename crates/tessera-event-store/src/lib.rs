//! Tessera storage adapters.
//!
//! Two interchangeable backends implement the core storage ports
//! (`EventStore`, `Outbox`, `Inbox`, `TransactionManager`):
//!
//! - [`memory`]: a process-local database with serialisable transactions,
//!   used in tests and single-node development.
//! - [`postgres`]: sqlx-backed adapters over the schema in [`schema`].

pub mod memory;
pub mod postgres;
pub mod schema;

//! Tessera core: shared event-sourcing and messaging abstractions.
//!
//! This crate defines the ports and domain primitives that every bounded
//! context and adapter depends on: the execution context, the aggregate
//! contract, the event store, the outbox/inbox and the event bus. It contains
//! no infrastructure code.

pub mod aggregate;
pub mod bus;
pub mod clock;
pub mod context;
pub mod envelope;
pub mod error;
pub mod event;
pub mod event_store;
pub mod inbox;
pub mod outbox;
pub mod repository;
pub mod transaction;

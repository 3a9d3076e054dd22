//! Tessera HTTP API.
//!
//! Exposes the tenant context over axum. The binary in `main.rs` reads
//! [`config::AppConfig`], wires storage and buses through [`bootstrap`] and
//! serves [`routes::app`].

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod state;
pub mod telemetry;

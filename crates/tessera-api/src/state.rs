//! Shared application state.

use std::sync::Arc;

use tessera_cqrs::{CommandBus, QueryBus};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<CommandBus>,
    pub queries: Arc<QueryBus>,
    /// Name of the storage backend, reported by the health check.
    pub storage: &'static str,
}

impl AppState {
    #[must_use]
    pub fn new(commands: CommandBus, queries: QueryBus, storage: &'static str) -> Self {
        Self {
            commands: Arc::new(commands),
            queries: Arc::new(queries),
            storage,
        }
    }
}

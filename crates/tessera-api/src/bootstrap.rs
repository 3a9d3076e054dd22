//! Wires storage, buses, handlers and the outbox publisher together.

use std::fmt;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tessera_core::clock::SharedClock;
use tessera_core::event_store::EventStore;
use tessera_core::inbox::Inbox;
use tessera_core::outbox::Outbox;
use tessera_core::transaction::TransactionManager;
use tessera_cqrs::{CommandBus, PipelineConfig, QueryBus};
use tessera_event_store::memory::MemoryDatabase;
use tessera_event_store::postgres::{PgEventStore, PgInbox, PgOutbox, PgTransactionManager};
use tessera_messaging::{
    InProcessEventBus, InboxConsumer, OutboxPublisher, PublisherConfig, Subscription,
};
use tessera_tenant::application::command_handlers::TenantCommandHandler;
use tessera_tenant::application::directory::TenantDirectory;
use tessera_tenant::application::query_handlers;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

const MAX_CONNECTIONS: u32 = 10;

/// The four storage ports, backed by one database.
#[derive(Clone)]
pub struct Storage {
    /// `memory` or `postgres`.
    pub kind: &'static str,
    pub event_store: Arc<dyn EventStore>,
    pub outbox: Arc<dyn Outbox>,
    pub inbox: Arc<dyn Inbox>,
    pub transactions: Arc<dyn TransactionManager>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Process-local storage. Everything is lost on exit.
    #[must_use]
    pub fn in_memory(clock: &SharedClock) -> Self {
        let db = MemoryDatabase::new();
        Self {
            kind: "memory",
            event_store: Arc::new(db.event_store()),
            outbox: Arc::new(db.outbox(clock.clone())),
            inbox: Arc::new(db.inbox(clock.clone())),
            transactions: Arc::new(db),
        }
    }

    /// Connects to PostgreSQL and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if no connection can be made and
    /// `AppError::Migration` if the schema cannot be brought up to date.
    pub async fn postgres(database_url: &str, clock: &SharedClock) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("database migrations applied");

        Ok(Self {
            kind: "postgres",
            event_store: Arc::new(PgEventStore::new(pool.clone())),
            outbox: Arc::new(PgOutbox::new(pool.clone(), clock.clone())),
            inbox: Arc::new(PgInbox::new(pool.clone(), clock.clone())),
            transactions: Arc::new(PgTransactionManager::new(pool)),
        })
    }
}

/// A wired application, ready to serve.
pub struct Application {
    pub state: AppState,
    pub events: InProcessEventBus,
    pub publisher: OutboxPublisher,
    pub directory: TenantDirectory,
    subscriptions: Vec<Subscription>,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("publisher", &self.publisher)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Unsubscribes the read-model consumers from the event bus.
    pub fn detach(self) {
        for subscription in self.subscriptions {
            subscription.dispose();
        }
    }
}

/// Builds buses and handlers over `storage`.
///
/// The tenant directory is fed from the event bus through an inbox-gated
/// consumer, so it only sees changes once the publisher has drained them
/// from the outbox.
///
/// # Errors
///
/// Returns `AppError::Wiring` if a handler is registered twice.
pub fn build(
    storage: Storage,
    clock: SharedClock,
    pipeline: &PipelineConfig,
    publisher: PublisherConfig,
) -> Result<Application, AppError> {
    let events = InProcessEventBus::new();
    let directory = TenantDirectory::new();

    let consumer = Arc::new(InboxConsumer::new(
        storage.inbox.clone(),
        storage.transactions.clone(),
        directory.clone(),
    ));
    let subscriptions = TenantDirectory::subscribe(&events, consumer);

    let mut commands = CommandBus::new(pipeline.build()).with_clock(clock.clone());
    TenantCommandHandler::new(
        storage.event_store.clone(),
        storage.outbox.clone(),
        storage.transactions.clone(),
        clock.clone(),
    )
    .register(&mut commands)?;

    let mut queries = QueryBus::new(pipeline.build()).with_clock(clock.clone());
    query_handlers::register(&mut queries, storage.event_store.clone(), directory.clone())?;

    let publisher = OutboxPublisher::new(
        storage.outbox,
        Arc::new(events.clone()),
        clock,
        publisher,
    );

    Ok(Application {
        state: AppState::new(commands, queries, storage.kind),
        events,
        publisher,
        directory,
        subscriptions,
    })
}

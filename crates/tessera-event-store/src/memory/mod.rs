//! Process-local storage backend.
//!
//! All stores created from one [`MemoryDatabase`] share a single state. A
//! transaction takes the database's writer lock for its whole lifetime and
//! works on a private copy of the state that replaces the shared state on
//! commit, so transactions are serialisable, atomic across the event store,
//! outbox and inbox, and see their own writes. Calls made outside a
//! transaction wait for the writer lock as well.

mod event_store;
mod inbox;
mod outbox;

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessera_core::clock::SharedClock;
use tessera_core::context::ExecutionContext;
use tessera_core::error::DomainError;
use tessera_core::event_store::{StoredEvent, StreamKey};
use tessera_core::outbox::OutboxRecord;
use tessera_core::transaction::{Transaction, TransactionHandle, TransactionManager};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

pub use event_store::InMemoryEventStore;
pub use inbox::InMemoryInbox;
pub use outbox::InMemoryOutbox;

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryState {
    pub(crate) streams: HashMap<StreamKey, Vec<StoredEvent>>,
    pub(crate) outbox: HashMap<String, OutboxRecord>,
    pub(crate) inbox: HashMap<String, DateTime<Utc>>,
}

#[derive(Debug)]
struct Shared {
    id: Uuid,
    state: Mutex<MemoryState>,
    writer: Arc<tokio::sync::Mutex<()>>,
}

/// Shared in-memory database backing the in-memory stores.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> DomainError {
    DomainError::Infrastructure("in-memory database lock poisoned".into())
}

impl MemoryDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                state: Mutex::new(MemoryState::default()),
                writer: Arc::new(tokio::sync::Mutex::new(())),
            }),
        }
    }

    /// Event store over this database.
    #[must_use]
    pub fn event_store(&self) -> InMemoryEventStore {
        InMemoryEventStore::new(self.clone())
    }

    /// Outbox over this database.
    #[must_use]
    pub fn outbox(&self, clock: SharedClock) -> InMemoryOutbox {
        InMemoryOutbox::new(self.clone(), clock)
    }

    /// Inbox over this database.
    #[must_use]
    pub fn inbox(&self, clock: SharedClock) -> InMemoryInbox {
        InMemoryInbox::new(self.clone(), clock)
    }

    /// Runs `f` against the state visible to `ctx`: the transaction's working
    /// copy when `ctx` carries one of this database's transactions, the
    /// shared state otherwise.
    pub(crate) async fn with_state<T, F>(
        &self,
        ctx: &ExecutionContext,
        f: F,
    ) -> Result<T, DomainError>
    where
        F: FnOnce(&mut MemoryState) -> Result<T, DomainError> + Send,
        T: Send,
    {
        if let Some(handle) = ctx.transaction() {
            let tx = self.own_transaction(handle)?;
            let mut working = tx.working.lock().map_err(poisoned)?;
            let state = working.as_mut().ok_or_else(|| {
                DomainError::Infrastructure(format!("transaction {} is already finished", tx.id))
            })?;
            return f(state);
        }

        let _writer = self.shared.writer.lock().await;
        let mut state = self.shared.state.lock().map_err(poisoned)?;
        f(&mut state)
    }

    fn own_transaction<'a>(
        &self,
        handle: &'a TransactionHandle,
    ) -> Result<&'a MemoryTransaction, DomainError> {
        handle
            .as_any()
            .downcast_ref::<MemoryTransaction>()
            .filter(|tx| tx.database_id == self.shared.id)
            .ok_or_else(|| {
                DomainError::Infrastructure(format!(
                    "transaction {} does not belong to this in-memory database",
                    handle.id()
                ))
            })
    }
}

/// A transaction on a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryTransaction {
    id: Uuid,
    database_id: Uuid,
    working: Mutex<Option<MemoryState>>,
    writer: Mutex<Option<OwnedMutexGuard<()>>>,
}

impl MemoryTransaction {
    fn finish(&self) -> Result<Option<MemoryState>, DomainError> {
        let state = self.working.lock().map_err(poisoned)?.take();
        self.writer.lock().map_err(poisoned)?.take();
        Ok(state)
    }
}

impl Transaction for MemoryTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl TransactionManager for MemoryDatabase {
    async fn begin(&self) -> Result<TransactionHandle, DomainError> {
        let writer = Arc::clone(&self.shared.writer).lock_owned().await;
        let snapshot = self.shared.state.lock().map_err(poisoned)?.clone();
        let tx = MemoryTransaction {
            id: Uuid::new_v4(),
            database_id: self.shared.id,
            working: Mutex::new(Some(snapshot)),
            writer: Mutex::new(Some(writer)),
        };
        debug!(transaction_id = %tx.id, "in-memory transaction started");
        Ok(Arc::new(tx))
    }

    async fn commit(&self, transaction: TransactionHandle) -> Result<(), DomainError> {
        let tx = self.own_transaction(&transaction)?;
        let working = {
            let mut working = tx.working.lock().map_err(poisoned)?;
            working.take().ok_or_else(|| {
                DomainError::Infrastructure(format!("transaction {} is already finished", tx.id))
            })?
        };
        *self.shared.state.lock().map_err(poisoned)? = working;
        tx.finish()?;
        debug!(transaction_id = %tx.id, "in-memory transaction committed");
        Ok(())
    }

    async fn rollback(&self, transaction: TransactionHandle) -> Result<(), DomainError> {
        let tx = self.own_transaction(&transaction)?;
        tx.finish()?;
        debug!(transaction_id = %tx.id, "in-memory transaction rolled back");
        Ok(())
    }
}

pub(crate) fn stream_len(events: &[StoredEvent]) -> i64 {
    i64::try_from(events.len()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tessera_core::context::Identity;
    use tessera_core::envelope::IntegrationEventEnvelope;
    use tessera_core::inbox::Inbox;
    use tessera_core::outbox::Outbox;
    use tessera_core::transaction::run_in_transaction;
    use tessera_test_support::FixedClock;

    use super::*;

    fn clock() -> SharedClock {
        Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ))
    }

    fn envelope(ctx: &ExecutionContext, message_id: &str) -> IntegrationEventEnvelope {
        IntegrationEventEnvelope::new(
            ctx,
            "TenantCreated",
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            serde_json::json!({}),
        )
        .with_message_id(message_id)
    }

    #[tokio::test]
    async fn test_committed_transaction_makes_all_writes_visible() {
        // Arrange
        let db = MemoryDatabase::new();
        let outbox = db.outbox(clock());
        let inbox = db.inbox(clock());
        let ctx = ExecutionContext::new(Identity::default());

        // Act
        let result: Result<(), DomainError> = run_in_transaction(&ctx, &db, |tx_ctx| {
            let outbox = outbox.clone();
            let inbox = inbox.clone();
            async move {
                outbox.append(&tx_ctx, envelope(&tx_ctx, "m-1")).await?;
                inbox.mark_processed(&tx_ctx, "in-1").await?;
                // Reads inside the transaction see its own writes.
                assert!(inbox.is_processed(&tx_ctx, "in-1").await?);
                Ok(())
            }
        })
        .await;

        // Assert
        result.unwrap();
        assert!(outbox.find(&ctx, "m-1").await.unwrap().is_some());
        assert!(inbox.is_processed(&ctx, "in-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_leaves_no_trace() {
        // Arrange
        let db = MemoryDatabase::new();
        let outbox = db.outbox(clock());
        let inbox = db.inbox(clock());
        let ctx = ExecutionContext::system();

        // Act
        let result: Result<(), DomainError> = run_in_transaction(&ctx, &db, |tx_ctx| {
            let outbox = outbox.clone();
            let inbox = inbox.clone();
            async move {
                outbox.append(&tx_ctx, envelope(&tx_ctx, "m-1")).await?;
                inbox.mark_processed(&tx_ctx, "in-1").await?;
                Err(DomainError::Validation("business rule failed".into()))
            }
        })
        .await;

        // Assert
        assert!(result.is_err());
        assert!(outbox.find(&ctx, "m-1").await.unwrap().is_none());
        assert!(!inbox.is_processed(&ctx, "in-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_transaction_is_rejected() {
        let db = MemoryDatabase::new();
        let other = MemoryDatabase::new();
        let inbox = db.inbox(clock());
        let tx = other.begin().await.unwrap();
        let ctx = ExecutionContext::system().with_transaction(Arc::clone(&tx));

        let result = inbox.is_processed(&ctx, "m-1").await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
        other.rollback(tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_twice_fails() {
        let db = MemoryDatabase::new();
        let tx = db.begin().await.unwrap();

        db.commit(Arc::clone(&tx)).await.unwrap();
        let second = db.commit(tx).await;

        assert!(matches!(second, Err(DomainError::Infrastructure(_))));
    }
}

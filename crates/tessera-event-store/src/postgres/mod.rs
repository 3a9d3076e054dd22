//! PostgreSQL storage backend.
//!
//! Each adapter runs on the connection of the transaction carried by the
//! [`ExecutionContext`] when there is one, and on a pooled connection
//! otherwise.

mod event_store;
mod inbox;
mod outbox;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use tessera_core::context::ExecutionContext;
use tessera_core::error::DomainError;
use tessera_core::transaction::{Transaction, TransactionHandle, TransactionManager};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

pub use event_store::PgEventStore;
pub use inbox::PgInbox;
pub use outbox::PgOutbox;

type SqlxTransaction = sqlx::Transaction<'static, Postgres>;

pub(crate) fn infra(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// An open PostgreSQL transaction.
pub struct PgTransaction {
    id: Uuid,
    inner: Mutex<Option<SqlxTransaction>>,
}

impl fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTransaction").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Transaction for PgTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn downcast(handle: &TransactionHandle) -> Result<&PgTransaction, DomainError> {
    handle.as_any().downcast_ref::<PgTransaction>().ok_or_else(|| {
        DomainError::Infrastructure(format!(
            "transaction {} is not a PostgreSQL transaction",
            handle.id()
        ))
    })
}

async fn take(handle: &TransactionHandle) -> Result<SqlxTransaction, DomainError> {
    let tx = downcast(handle)?;
    tx.inner.lock().await.take().ok_or_else(|| {
        DomainError::Infrastructure(format!("transaction {} is already finished", tx.id))
    })
}

/// [`TransactionManager`] over a connection pool.
#[derive(Debug, Clone)]
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    /// Creates a manager over `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    async fn begin(&self) -> Result<TransactionHandle, DomainError> {
        let inner = self.pool.begin().await.map_err(infra)?;
        let tx = PgTransaction {
            id: Uuid::new_v4(),
            inner: Mutex::new(Some(inner)),
        };
        debug!(transaction_id = %tx.id, "transaction started");
        Ok(Arc::new(tx))
    }

    async fn commit(&self, transaction: TransactionHandle) -> Result<(), DomainError> {
        take(&transaction).await?.commit().await.map_err(infra)?;
        debug!(transaction_id = %transaction.id(), "transaction committed");
        Ok(())
    }

    async fn rollback(&self, transaction: TransactionHandle) -> Result<(), DomainError> {
        take(&transaction).await?.rollback().await.map_err(infra)?;
        debug!(transaction_id = %transaction.id(), "transaction rolled back");
        Ok(())
    }
}

/// Connection a single adapter call runs on.
pub(crate) enum Conn<'a> {
    Transaction(MutexGuard<'a, Option<SqlxTransaction>>),
    Pooled(PoolConnection<Postgres>),
}

impl<'a> Conn<'a> {
    /// Acquires the context's transaction connection, or a pooled one.
    pub(crate) async fn acquire(
        pool: &PgPool,
        ctx: &'a ExecutionContext,
    ) -> Result<Self, DomainError> {
        match ctx.transaction() {
            Some(handle) => {
                let tx = downcast(handle)?;
                let guard = tx.inner.lock().await;
                if guard.is_none() {
                    return Err(DomainError::Infrastructure(format!(
                        "transaction {} is already finished",
                        tx.id
                    )));
                }
                Ok(Conn::Transaction(guard))
            }
            None => Ok(Conn::Pooled(pool.acquire().await.map_err(infra)?)),
        }
    }

    pub(crate) fn connection(&mut self) -> Result<&mut PgConnection, DomainError> {
        match self {
            Conn::Transaction(guard) => guard
                .as_mut()
                .map(|tx| &mut **tx)
                .ok_or_else(|| DomainError::Infrastructure("transaction already finished".into())),
            Conn::Pooled(conn) => Ok(&mut **conn),
        }
    }
}

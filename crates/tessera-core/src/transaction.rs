//! Transaction port.
//!
//! Adapters hand out type-erased [`Transaction`] handles; each adapter
//! downcasts its own handle back through [`Transaction::as_any`]. Handles are
//! carried inside an [`ExecutionContext`] so that every store touched within a
//! unit of work writes through the same transaction.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::DomainError;

/// An open database transaction.
pub trait Transaction: Send + Sync + fmt::Debug + 'static {
    /// Identifier for logging.
    fn id(&self) -> Uuid;

    /// Access to the concrete adapter type.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to an open transaction.
pub type TransactionHandle = Arc<dyn Transaction>;

/// Begins, commits and rolls back transactions for one storage backend.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<TransactionHandle, DomainError>;

    /// Commits `transaction`. Committing an already finished transaction is
    /// an error.
    async fn commit(&self, transaction: TransactionHandle) -> Result<(), DomainError>;

    /// Discards every write made through `transaction`.
    async fn rollback(&self, transaction: TransactionHandle) -> Result<(), DomainError>;
}

/// Runs `work` inside a transaction.
///
/// `work` receives a context bound to the transaction; the transaction
/// commits when it returns `Ok` and rolls back when it returns `Err`. When
/// `ctx` is already inside a transaction, `work` joins it and the outer unit
/// of work decides the outcome.
///
/// # Errors
///
/// Returns the error produced by `work`, or the `DomainError` raised while
/// beginning or committing the transaction.
pub async fn run_in_transaction<T, E, F, Fut>(
    ctx: &ExecutionContext,
    manager: &dyn TransactionManager,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(ExecutionContext) -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    E: From<DomainError>,
{
    if ctx.transaction().is_some() {
        return work(ctx.clone()).await;
    }

    let transaction = manager.begin().await?;
    let scoped = ctx.with_transaction(Arc::clone(&transaction));

    match work(scoped).await {
        Ok(value) => {
            manager.commit(transaction).await?;
            Ok(value)
        }
        Err(err) => {
            let transaction_id = transaction.id();
            if let Err(rollback_err) = manager.rollback(transaction).await {
                warn!(
                    transaction_id = %transaction_id,
                    error = %rollback_err,
                    "rollback failed after unit of work error"
                );
            }
            Err(err)
        }
    }
}

use std::fmt;

use async_trait::async_trait;
use sqlx::PgPool;
use tessera_core::clock::SharedClock;
use tessera_core::context::ExecutionContext;
use tessera_core::error::DomainError;
use tessera_core::inbox::Inbox;

use super::{Conn, infra};
use crate::schema;

/// PostgreSQL-backed inbox.
#[derive(Clone)]
pub struct PgInbox {
    pool: PgPool,
    clock: SharedClock,
}

impl fmt::Debug for PgInbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgInbox").field("pool", &self.pool).finish_non_exhaustive()
    }
}

impl PgInbox {
    /// Creates a new `PgInbox`.
    #[must_use]
    pub fn new(pool: PgPool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl Inbox for PgInbox {
    async fn is_processed(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<bool, DomainError> {
        let mut conn = Conn::acquire(&self.pool, ctx).await?;
        sqlx::query_scalar(schema::SELECT_INBOX_EXISTS)
            .bind(message_id)
            .fetch_one(conn.connection()?)
            .await
            .map_err(infra)
    }

    async fn mark_processed(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<bool, DomainError> {
        let mut conn = Conn::acquire(&self.pool, ctx).await?;
        let result = sqlx::query(schema::INSERT_INBOX)
            .bind(message_id)
            .bind(self.clock.now())
            .execute(conn.connection()?)
            .await
            .map_err(infra)?;
        Ok(result.rows_affected() == 1)
    }
}

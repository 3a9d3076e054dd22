use std::fmt;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tessera_core::clock::SharedClock;
use tessera_core::context::ExecutionContext;
use tessera_core::envelope::IntegrationEventEnvelope;
use tessera_core::error::DomainError;
use tessera_core::outbox::{ListPending, MarkFailed, Outbox, OutboxRecord, OutboxStatus};
use tracing::debug;

use super::{Conn, infra, is_unique_violation};
use crate::schema;

/// PostgreSQL-backed outbox.
#[derive(Clone)]
pub struct PgOutbox {
    pool: PgPool,
    clock: SharedClock,
}

impl fmt::Debug for PgOutbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgOutbox").field("pool", &self.pool).finish_non_exhaustive()
    }
}

impl PgOutbox {
    /// Creates a new `PgOutbox`.
    #[must_use]
    pub fn new(pool: PgPool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }
}

fn record_from_row(row: &PgRow) -> Result<OutboxRecord, DomainError> {
    let status: String = row.try_get("status").map_err(infra)?;
    let envelope = IntegrationEventEnvelope {
        message_id: row.try_get("message_id").map_err(infra)?,
        event_type: row.try_get("event_type").map_err(infra)?,
        occurred_at: row.try_get("occurred_at").map_err(infra)?,
        schema_version: row.try_get("schema_version").map_err(infra)?,
        tenant_id: row.try_get("tenant_id").map_err(infra)?,
        user_id: row.try_get("user_id").map_err(infra)?,
        request_id: row.try_get("request_id").map_err(infra)?,
        payload: row.try_get("payload").map_err(infra)?,
    };
    Ok(OutboxRecord {
        envelope,
        status: status.parse::<OutboxStatus>()?,
        attempts: row.try_get("attempts").map_err(infra)?,
        next_attempt_at: row.try_get("next_attempt_at").map_err(infra)?,
        last_error: row.try_get("last_error").map_err(infra)?,
        created_at: row.try_get("created_at").map_err(infra)?,
        updated_at: row.try_get("updated_at").map_err(infra)?,
    })
}

#[async_trait]
impl Outbox for PgOutbox {
    async fn append(
        &self,
        ctx: &ExecutionContext,
        envelope: IntegrationEventEnvelope,
    ) -> Result<(), DomainError> {
        let now = self.clock.now();
        let mut conn = Conn::acquire(&self.pool, ctx).await?;
        sqlx::query(schema::INSERT_OUTBOX)
            .bind(&envelope.message_id)
            .bind(&envelope.event_type)
            .bind(envelope.occurred_at)
            .bind(envelope.schema_version)
            .bind(&envelope.tenant_id)
            .bind(&envelope.user_id)
            .bind(&envelope.request_id)
            .bind(&envelope.payload)
            .bind(now)
            .execute(conn.connection()?)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    DomainError::OutboxAppendConflict(envelope.message_id.clone())
                } else {
                    infra(err)
                }
            })?;
        debug!(
            message_id = %envelope.message_id,
            event_type = %envelope.event_type,
            "envelope staged in outbox"
        );
        Ok(())
    }

    async fn list_pending(
        &self,
        ctx: &ExecutionContext,
        query: ListPending,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let mut conn = Conn::acquire(&self.pool, ctx).await?;
        let rows = sqlx::query(&schema::select_pending_outbox())
            .bind(query.now)
            .bind(limit)
            .fetch_all(conn.connection()?)
            .await
            .map_err(infra)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn mark_published(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<(), DomainError> {
        let mut conn = Conn::acquire(&self.pool, ctx).await?;
        sqlx::query(schema::MARK_OUTBOX_PUBLISHED)
            .bind(message_id)
            .bind(self.clock.now())
            .execute(conn.connection()?)
            .await
            .map_err(infra)?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        ctx: &ExecutionContext,
        failure: MarkFailed,
    ) -> Result<(), DomainError> {
        let mut conn = Conn::acquire(&self.pool, ctx).await?;
        sqlx::query(schema::MARK_OUTBOX_FAILED)
            .bind(&failure.message_id)
            .bind(failure.attempts)
            .bind(failure.next_attempt_at)
            .bind(&failure.last_error)
            .bind(self.clock.now())
            .execute(conn.connection()?)
            .await
            .map_err(infra)?;
        Ok(())
    }

    async fn find(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<Option<OutboxRecord>, DomainError> {
        let mut conn = Conn::acquire(&self.pool, ctx).await?;
        let row = sqlx::query(&schema::select_outbox_by_id())
            .bind(message_id)
            .fetch_optional(conn.connection()?)
            .await
            .map_err(infra)?;
        row.as_ref().map(record_from_row).transpose()
    }
}

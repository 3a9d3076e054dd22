use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tessera_core::context::ExecutionContext;
use tessera_core::error::DomainError;
use tessera_core::event_store::{AppendToStream, EventStore, EventStream, StoredEvent, StreamKey};
use tracing::debug;

use super::{Conn, infra, is_unique_violation};
use crate::schema;

/// PostgreSQL-backed event store.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tenant_column(stream: &StreamKey) -> &str {
    stream.tenant().unwrap_or(schema::NO_TENANT)
}

fn event_from_row(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    Ok(StoredEvent {
        event_id: row.try_get("event_id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        schema_version: row.try_get("schema_version")?,
        sequence_number: row.try_get("sequence_number")?,
        actor_id: row.try_get("actor_id")?,
        correlation_id: row.try_get("correlation_id")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

async fn append_on(conn: &mut PgConnection, request: &AppendToStream) -> Result<(), DomainError> {
    let stream = &request.stream;
    let tenant = tenant_column(stream);

    let actual: i64 = sqlx::query_scalar(schema::SELECT_STREAM_VERSION)
        .bind(tenant)
        .bind(&stream.aggregate_type)
        .bind(&stream.aggregate_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(infra)?;
    if actual != request.expected_version {
        return Err(DomainError::ConcurrencyConflict {
            stream: stream.to_string(),
            expected: request.expected_version,
            actual,
        });
    }

    for event in &request.events {
        let actor_id = event.actor_id.as_deref().or(request.actor_id.as_deref());
        sqlx::query(schema::INSERT_EVENT)
            .bind(event.event_id)
            .bind(tenant)
            .bind(&stream.aggregate_type)
            .bind(&stream.aggregate_id)
            .bind(event.sequence_number)
            .bind(&event.event_type)
            .bind(event.schema_version)
            .bind(&event.payload)
            .bind(actor_id)
            .bind(&event.correlation_id)
            .bind(event.occurred_at)
            .execute(&mut *conn)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    // A concurrent writer committed between the version read
                    // and this insert.
                    DomainError::ConcurrencyConflict {
                        stream: stream.to_string(),
                        expected: request.expected_version,
                        actual: request.expected_version + 1,
                    }
                } else {
                    infra(err)
                }
            })?;
    }
    Ok(())
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append_to_stream(
        &self,
        ctx: &ExecutionContext,
        request: AppendToStream,
    ) -> Result<(), DomainError> {
        if request.events.is_empty() {
            return Ok(());
        }

        if ctx.transaction().is_some() {
            let mut conn = Conn::acquire(&self.pool, ctx).await?;
            append_on(conn.connection()?, &request).await?;
        } else {
            let mut tx = self.pool.begin().await.map_err(infra)?;
            append_on(&mut tx, &request).await?;
            tx.commit().await.map_err(infra)?;
        }

        debug!(
            stream = %request.stream,
            appended = request.events.len(),
            expected_version = request.expected_version,
            "events appended"
        );
        Ok(())
    }

    async fn load_stream(
        &self,
        ctx: &ExecutionContext,
        stream: &StreamKey,
    ) -> Result<EventStream, DomainError> {
        let mut conn = Conn::acquire(&self.pool, ctx).await?;
        let rows = sqlx::query(schema::SELECT_STREAM)
            .bind(tenant_column(stream))
            .bind(&stream.aggregate_type)
            .bind(&stream.aggregate_id)
            .fetch_all(conn.connection()?)
            .await
            .map_err(infra)?;

        let events = rows
            .iter()
            .map(event_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(infra)?;
        let current_version = events.last().map_or(0, |e| e.sequence_number);
        Ok(EventStream {
            events,
            current_version,
        })
    }
}

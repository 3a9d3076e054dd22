use async_trait::async_trait;
use tessera_core::clock::SharedClock;
use tessera_core::context::ExecutionContext;
use tessera_core::envelope::IntegrationEventEnvelope;
use tessera_core::error::DomainError;
use tessera_core::outbox::{ListPending, MarkFailed, Outbox, OutboxRecord, OutboxStatus};

use super::MemoryDatabase;

/// [`Outbox`] over a [`MemoryDatabase`].
#[derive(Clone)]
pub struct InMemoryOutbox {
    db: MemoryDatabase,
    clock: SharedClock,
}

impl std::fmt::Debug for InMemoryOutbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryOutbox").field("db", &self.db).finish_non_exhaustive()
    }
}

impl InMemoryOutbox {
    pub(crate) fn new(db: MemoryDatabase, clock: SharedClock) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn append(
        &self,
        ctx: &ExecutionContext,
        envelope: IntegrationEventEnvelope,
    ) -> Result<(), DomainError> {
        let now = self.clock.now();
        self.db
            .with_state(ctx, move |state| {
                if state.outbox.contains_key(&envelope.message_id) {
                    return Err(DomainError::OutboxAppendConflict(envelope.message_id));
                }
                state
                    .outbox
                    .insert(envelope.message_id.clone(), OutboxRecord::pending(envelope, now));
                Ok(())
            })
            .await
    }

    async fn list_pending(
        &self,
        ctx: &ExecutionContext,
        query: ListPending,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        self.db
            .with_state(ctx, move |state| {
                let mut due: Vec<OutboxRecord> = state
                    .outbox
                    .values()
                    .filter(|record| record.is_due(query.now))
                    .cloned()
                    .collect();
                due.sort_by(|a, b| {
                    a.envelope
                        .occurred_at
                        .cmp(&b.envelope.occurred_at)
                        .then_with(|| a.message_id().cmp(b.message_id()))
                });
                due.truncate(query.limit);
                Ok(due)
            })
            .await
    }

    async fn mark_published(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<(), DomainError> {
        let now = self.clock.now();
        self.db
            .with_state(ctx, |state| {
                if let Some(record) = state.outbox.get_mut(message_id) {
                    if record.status == OutboxStatus::Pending {
                        record.status = OutboxStatus::Published;
                        record.updated_at = now;
                    }
                }
                Ok(())
            })
            .await
    }

    async fn mark_failed(
        &self,
        ctx: &ExecutionContext,
        failure: MarkFailed,
    ) -> Result<(), DomainError> {
        let now = self.clock.now();
        self.db
            .with_state(ctx, move |state| {
                if let Some(record) = state.outbox.get_mut(&failure.message_id) {
                    if record.status == OutboxStatus::Pending {
                        record.attempts = failure.attempts;
                        record.next_attempt_at = failure.next_attempt_at;
                        record.last_error = Some(failure.last_error);
                        record.updated_at = now;
                    }
                }
                Ok(())
            })
            .await
    }

    async fn find(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<Option<OutboxRecord>, DomainError> {
        self.db
            .with_state(ctx, |state| Ok(state.outbox.get(message_id).cloned()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tessera_test_support::FixedClock;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn outbox() -> InMemoryOutbox {
        MemoryDatabase::new().outbox(Arc::new(FixedClock(now())))
    }

    fn envelope(message_id: &str, occurred_at: DateTime<Utc>) -> IntegrationEventEnvelope {
        IntegrationEventEnvelope::new(
            &ExecutionContext::system(),
            "TenantCreated",
            occurred_at,
            serde_json::json!({"tenantId": "a-1"}),
        )
        .with_message_id(message_id)
    }

    fn pending(limit: usize) -> ListPending {
        ListPending { now: now(), limit }
    }

    #[tokio::test]
    async fn test_append_stores_pending_record_due_now() {
        // Arrange
        let outbox = outbox();
        let ctx = ExecutionContext::system();

        // Act
        outbox.append(&ctx, envelope("m-1", now())).await.unwrap();

        // Assert
        let record = outbox.find(&ctx, "m-1").await.unwrap().unwrap();
        assert_eq!(record.status, OutboxStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.next_attempt_at, now());
        assert_eq!(record.last_error, None);
    }

    #[tokio::test]
    async fn test_duplicate_message_id_is_an_append_conflict() {
        let outbox = outbox();
        let ctx = ExecutionContext::system();
        outbox.append(&ctx, envelope("m-1", now())).await.unwrap();

        let result = outbox
            .append(&ctx, envelope("m-1", now() - Duration::minutes(1)))
            .await;

        assert!(matches!(result, Err(DomainError::OutboxAppendConflict(id)) if id == "m-1"));
        let records = outbox.list_pending(&ctx, pending(10)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].envelope.occurred_at, now());
    }

    #[tokio::test]
    async fn test_list_pending_orders_by_occurrence_then_message_id_and_limits() {
        // Arrange
        let outbox = outbox();
        let ctx = ExecutionContext::system();
        let earlier = now() - Duration::minutes(5);
        outbox.append(&ctx, envelope("m-c", now())).await.unwrap();
        outbox.append(&ctx, envelope("m-b", earlier)).await.unwrap();
        outbox.append(&ctx, envelope("m-a", now())).await.unwrap();

        // Act
        let all = outbox.list_pending(&ctx, pending(10)).await.unwrap();
        let first_two = outbox.list_pending(&ctx, pending(2)).await.unwrap();

        // Assert
        let ids: Vec<&str> = all.iter().map(OutboxRecord::message_id).collect();
        assert_eq!(ids, vec!["m-b", "m-a", "m-c"]);
        assert_eq!(first_two.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_record_is_hidden_until_due_and_keeps_its_error() {
        // Arrange
        let outbox = outbox();
        let ctx = ExecutionContext::system();
        outbox.append(&ctx, envelope("m-1", now())).await.unwrap();

        // Act
        outbox
            .mark_failed(
                &ctx,
                MarkFailed {
                    message_id: "m-1".to_owned(),
                    attempts: 1,
                    next_attempt_at: now() + Duration::seconds(1),
                    last_error: "bus down".to_owned(),
                },
            )
            .await
            .unwrap();

        // Assert
        assert!(outbox.list_pending(&ctx, pending(10)).await.unwrap().is_empty());
        let later = ListPending {
            now: now() + Duration::seconds(1),
            limit: 10,
        };
        let due = outbox.list_pending(&ctx, later).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
        assert_eq!(due[0].last_error.as_deref(), Some("bus down"));
        assert_eq!(due[0].status, OutboxStatus::Pending);
    }

    #[tokio::test]
    async fn test_mark_published_is_idempotent_and_terminal() {
        // Arrange
        let outbox = outbox();
        let ctx = ExecutionContext::system();
        outbox.append(&ctx, envelope("m-1", now())).await.unwrap();

        // Act
        outbox.mark_published(&ctx, "m-1").await.unwrap();
        outbox.mark_published(&ctx, "m-1").await.unwrap();
        outbox
            .mark_failed(
                &ctx,
                MarkFailed {
                    message_id: "m-1".to_owned(),
                    attempts: 7,
                    next_attempt_at: now(),
                    last_error: "late failure".to_owned(),
                },
            )
            .await
            .unwrap();

        // Assert
        let record = outbox.find(&ctx, "m-1").await.unwrap().unwrap();
        assert_eq!(record.status, OutboxStatus::Published);
        assert_eq!(record.attempts, 0);
        assert!(outbox.list_pending(&ctx, pending(10)).await.unwrap().is_empty());
    }
}

//! Integration tests for `PgOutbox` and `PgInbox`.
//!
//! These need a PostgreSQL server reachable through `DATABASE_URL`; run them
//! with `cargo test -- --ignored`.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::PgPool;
use tessera_core::context::{ExecutionContext, Identity};
use tessera_core::envelope::IntegrationEventEnvelope;
use tessera_core::error::DomainError;
use tessera_core::inbox::Inbox;
use tessera_core::outbox::{ListPending, MarkFailed, Outbox, OutboxStatus};
use tessera_core::transaction::run_in_transaction;
use tessera_event_store::postgres::{PgInbox, PgOutbox, PgTransactionManager};
use tessera_test_support::FixedClock;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(now()))
}

fn ctx() -> ExecutionContext {
    ExecutionContext::new(Identity::new(
        Some("t-1".to_owned()),
        Some("u-1".to_owned()),
        Some("r-1".to_owned()),
    ))
}

fn envelope(message_id: &str, occurred_at: DateTime<Utc>) -> IntegrationEventEnvelope {
    IntegrationEventEnvelope::new(
        &ctx(),
        "TenantCreated",
        occurred_at,
        serde_json::json!({"tenantId": "a-1"}),
    )
    .with_message_id(message_id)
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_append_persists_full_envelope_as_pending(pool: PgPool) {
    // Arrange
    let outbox = PgOutbox::new(pool, clock());

    // Act
    outbox.append(&ctx(), envelope("m-1", now())).await.unwrap();

    // Assert
    let record = outbox.find(&ctx(), "m-1").await.unwrap().unwrap();
    assert_eq!(record.status, OutboxStatus::Pending);
    assert_eq!(record.attempts, 0);
    assert_eq!(record.envelope.tenant_id.as_deref(), Some("t-1"));
    assert_eq!(record.envelope.user_id.as_deref(), Some("u-1"));
    assert_eq!(record.envelope.request_id.as_deref(), Some("r-1"));
    assert_eq!(record.envelope.payload["tenantId"], "a-1");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_message_id_is_an_append_conflict(pool: PgPool) {
    let outbox = PgOutbox::new(pool, clock());
    outbox.append(&ctx(), envelope("m-1", now())).await.unwrap();

    let result = outbox
        .append(&ctx(), envelope("m-1", now() - Duration::minutes(1)))
        .await;

    assert!(matches!(result, Err(DomainError::OutboxAppendConflict(_))));
    let records = outbox
        .list_pending(&ctx(), ListPending { now: now(), limit: 10 })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].envelope.occurred_at, now());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_list_pending_respects_order_due_time_and_limit(pool: PgPool) {
    // Arrange
    let outbox = PgOutbox::new(pool, clock());
    let c = ctx();
    outbox.append(&c, envelope("m-late", now())).await.unwrap();
    outbox
        .append(&c, envelope("m-early", now() - Duration::minutes(1)))
        .await
        .unwrap();
    outbox.append(&c, envelope("m-later", now())).await.unwrap();
    outbox
        .mark_failed(
            &c,
            MarkFailed {
                message_id: "m-later".to_owned(),
                attempts: 1,
                next_attempt_at: now() + Duration::seconds(1),
                last_error: "bus down".to_owned(),
            },
        )
        .await
        .unwrap();

    // Act
    let due = outbox
        .list_pending(&c, ListPending { now: now(), limit: 10 })
        .await
        .unwrap();
    let limited = outbox
        .list_pending(&c, ListPending { now: now(), limit: 1 })
        .await
        .unwrap();

    // Assert
    let ids: Vec<&str> = due.iter().map(|r| r.message_id()).collect();
    assert_eq!(ids, vec!["m-early", "m-late"]);
    assert_eq!(limited.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_published_record_ignores_later_failures(pool: PgPool) {
    let outbox = PgOutbox::new(pool, clock());
    let c = ctx();
    outbox.append(&c, envelope("m-1", now())).await.unwrap();

    outbox.mark_published(&c, "m-1").await.unwrap();
    outbox.mark_published(&c, "m-1").await.unwrap();
    outbox
        .mark_failed(
            &c,
            MarkFailed {
                message_id: "m-1".to_owned(),
                attempts: 3,
                next_attempt_at: now(),
                last_error: "late".to_owned(),
            },
        )
        .await
        .unwrap();

    let record = outbox.find(&c, "m-1").await.unwrap().unwrap();
    assert_eq!(record.status, OutboxStatus::Published);
    assert_eq!(record.attempts, 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_inbox_marks_each_message_once(pool: PgPool) {
    let inbox = PgInbox::new(pool, clock());
    let c = ctx();

    let first = inbox.mark_processed(&c, "m-1").await.unwrap();
    let second = inbox.mark_processed(&c, "m-1").await.unwrap();

    assert!(first);
    assert!(!second);
    assert!(inbox.is_processed(&c, "m-1").await.unwrap());
    assert!(!inbox.is_processed(&c, "m-2").await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_outbox_and_inbox_writes_share_the_transaction_outcome(pool: PgPool) {
    // Arrange
    let manager = PgTransactionManager::new(pool.clone());
    let outbox = PgOutbox::new(pool.clone(), clock());
    let inbox = PgInbox::new(pool, clock());
    let c = ctx();

    // Act
    let result: Result<(), DomainError> = run_in_transaction(&c, &manager, |tx_ctx| {
        let outbox = outbox.clone();
        let inbox = inbox.clone();
        async move {
            outbox.append(&tx_ctx, envelope("m-1", now())).await?;
            inbox.mark_processed(&tx_ctx, "in-1").await?;
            Err(DomainError::Validation("abort".into()))
        }
    })
    .await;

    // Assert
    assert!(result.is_err());
    assert!(outbox.find(&c, "m-1").await.unwrap().is_none());
    assert!(!inbox.is_processed(&c, "in-1").await.unwrap());
}

//! Outbox port: durable staging of envelopes awaiting publication.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::envelope::IntegrationEventEnvelope;
use crate::error::DomainError;

/// Delivery state of an outbox record. `Published` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Waiting for (re)delivery.
    Pending,
    /// Delivered to the event bus.
    Published,
}

impl OutboxStatus {
    /// Column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "published" => Ok(Self::Published),
            other => Err(DomainError::Infrastructure(format!(
                "unknown outbox status: {other}"
            ))),
        }
    }
}

/// An envelope plus its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    /// The envelope to deliver.
    #[serde(flatten)]
    pub envelope: IntegrationEventEnvelope,
    /// Delivery state.
    pub status: OutboxStatus,
    /// Failed delivery attempts so far.
    pub attempts: i32,
    /// Earliest time the next delivery may be tried.
    pub next_attempt_at: DateTime<Utc>,
    /// Error of the last failed attempt.
    pub last_error: Option<String>,
    /// When the record was appended.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl OutboxRecord {
    /// A fresh pending record, due immediately.
    #[must_use]
    pub fn pending(envelope: IntegrationEventEnvelope, now: DateTime<Utc>) -> Self {
        Self {
            envelope,
            status: OutboxStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The record's message id.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.envelope.message_id
    }

    /// `true` when the record is pending and due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending && self.next_attempt_at <= now
    }
}

/// Arguments of [`Outbox::list_pending`].
#[derive(Debug, Clone, Copy)]
pub struct ListPending {
    /// Only records due at or before this instant are returned.
    pub now: DateTime<Utc>,
    /// Maximum number of records.
    pub limit: usize,
}

/// Arguments of [`Outbox::mark_failed`].
#[derive(Debug, Clone)]
pub struct MarkFailed {
    /// Record to update.
    pub message_id: String,
    /// New attempt count.
    pub attempts: i32,
    /// When the record becomes due again.
    pub next_attempt_at: DateTime<Utc>,
    /// Error to remember.
    pub last_error: String,
}

/// Durable store for envelopes awaiting publication.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Stages an envelope. Must run in the same transaction as the state
    /// change it announces.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::OutboxAppendConflict` when the message id is
    /// already present.
    async fn append(
        &self,
        ctx: &ExecutionContext,
        envelope: IntegrationEventEnvelope,
    ) -> Result<(), DomainError>;

    /// Lists pending, due records ordered by `(occurred_at, message_id)`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn list_pending(
        &self,
        ctx: &ExecutionContext,
        query: ListPending,
    ) -> Result<Vec<OutboxRecord>, DomainError>;

    /// Marks a record published. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn mark_published(&self, ctx: &ExecutionContext, message_id: &str)
    -> Result<(), DomainError>;

    /// Records a failed attempt. Never deletes the record and never touches a
    /// published record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn mark_failed(&self, ctx: &ExecutionContext, failure: MarkFailed)
    -> Result<(), DomainError>;

    /// Fetches one record by message id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn find(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<Option<OutboxRecord>, DomainError>;
}

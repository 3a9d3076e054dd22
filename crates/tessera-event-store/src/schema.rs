//! SQL used by the PostgreSQL adapters.
//!
//! Tables are created by the migrations under `migrations/` at the workspace
//! root. Platform-level streams and envelopes without a tenant store the empty
//! string in `domain_events.tenant_id`, so the stream uniqueness constraint
//! also covers them.

/// Tenant column value for streams that belong to no tenant.
pub const NO_TENANT: &str = "";

/// Current version of a stream: its highest sequence number, or 0.
pub const SELECT_STREAM_VERSION: &str = r"
SELECT COALESCE(MAX(sequence_number), 0)
FROM domain_events
WHERE tenant_id = $1 AND aggregate_type = $2 AND aggregate_id = $3
";

/// Appends one event. Violates `uq_domain_events_stream_sequence` when a
/// concurrent writer already took the sequence number.
pub const INSERT_EVENT: &str = r"
INSERT INTO domain_events (
    event_id, tenant_id, aggregate_type, aggregate_id, sequence_number,
    event_type, schema_version, payload, actor_id, correlation_id, occurred_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
";

/// All events of one stream in sequence order.
pub const SELECT_STREAM: &str = r"
SELECT event_id, aggregate_id, sequence_number, event_type, schema_version,
       payload, actor_id, correlation_id, occurred_at
FROM domain_events
WHERE tenant_id = $1 AND aggregate_type = $2 AND aggregate_id = $3
ORDER BY sequence_number ASC
";

/// Stages an envelope as a pending outbox record.
pub const INSERT_OUTBOX: &str = r"
INSERT INTO outbox (
    message_id, event_type, occurred_at, schema_version, tenant_id, user_id,
    request_id, payload, status, attempts, next_attempt_at, last_error,
    created_at, updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 0, $9, NULL, $9, $9)
";

const OUTBOX_COLUMNS: &str = "message_id, event_type, occurred_at, schema_version, tenant_id, \
     user_id, request_id, payload, status, attempts, next_attempt_at, last_error, created_at, \
     updated_at";

/// Pending records due at `$1`, oldest first, at most `$2`.
#[must_use]
pub fn select_pending_outbox() -> String {
    format!(
        "SELECT {OUTBOX_COLUMNS} FROM outbox \
         WHERE status = 'pending' AND next_attempt_at <= $1 \
         ORDER BY occurred_at ASC, message_id ASC \
         LIMIT $2"
    )
}

/// One outbox record by message id.
#[must_use]
pub fn select_outbox_by_id() -> String {
    format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE message_id = $1")
}

/// Marks a pending record published. Published records are left untouched.
pub const MARK_OUTBOX_PUBLISHED: &str = r"
UPDATE outbox
SET status = 'published', updated_at = $2
WHERE message_id = $1 AND status = 'pending'
";

/// Records a failed delivery attempt on a pending record.
pub const MARK_OUTBOX_FAILED: &str = r"
UPDATE outbox
SET attempts = $2, next_attempt_at = $3, last_error = $4, updated_at = $5
WHERE message_id = $1 AND status = 'pending'
";

/// Whether a message id is recorded in the inbox.
pub const SELECT_INBOX_EXISTS: &str = r"
SELECT EXISTS (SELECT 1 FROM inbox WHERE message_id = $1)
";

/// Records a message id; a duplicate is silently skipped.
pub const INSERT_INBOX: &str = r"
INSERT INTO inbox (message_id, processed_at)
VALUES ($1, $2)
ON CONFLICT (message_id) DO NOTHING
";

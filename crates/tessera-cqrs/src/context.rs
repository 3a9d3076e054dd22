//! Per-dispatch context threaded through the middleware chain.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tessera_core::context::{ExecutionContext, Identity};

use crate::extensions::Extensions;
use crate::message::Message;

/// Whether a dispatch is a command or a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// State-changing request.
    Command,
    /// Read-only request.
    Query,
}

impl MessageKind {
    /// Lowercase label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Query => "query",
        }
    }
}

/// Created fresh for each dispatch.
///
/// Identity comes from the caller's [`ExecutionContext`], never from the
/// message. [`extensions`](Self::extensions_mut) is the only part middleware
/// may change.
#[derive(Debug)]
pub struct CqrsExecutionContext {
    kind: MessageKind,
    message: Arc<dyn Message>,
    context: ExecutionContext,
    started_at: DateTime<Utc>,
    started: Instant,
    extensions: Extensions,
}

impl CqrsExecutionContext {
    /// Starts a dispatch of `message` for the flow in `context`.
    #[must_use]
    pub fn new(
        kind: MessageKind,
        message: Arc<dyn Message>,
        context: ExecutionContext,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            message,
            context,
            started_at,
            started: Instant::now(),
            extensions: Extensions::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Routing key of the dispatched message.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        self.message.message_type()
    }

    /// The dispatched message.
    #[must_use]
    pub fn message(&self) -> &dyn Message {
        self.message.as_ref()
    }

    /// The caller's execution context.
    #[must_use]
    pub fn execution_context(&self) -> &ExecutionContext {
        &self.context
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        self.context.identity()
    }

    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.context.tenant_id()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.context.user_id()
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.context.request_id()
    }

    /// Wall-clock start of the dispatch.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time spent since the dispatch started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

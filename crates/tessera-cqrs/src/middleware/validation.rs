//! Rejects malformed messages before anything else runs.

use async_trait::async_trait;
use tracing::debug;

use crate::context::CqrsExecutionContext;
use crate::error::DispatchError;
use crate::pipeline::{Middleware, Next, Output};

/// Runs [`Message::validate`](crate::Message::validate) and fails with every
/// violation at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationMiddleware;

#[async_trait]
impl Middleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn handle(
        &self,
        ctx: &mut CqrsExecutionContext,
        next: Next<'_>,
    ) -> Result<Output, DispatchError> {
        let violations = ctx.message().validate();
        if !violations.is_empty() {
            debug!(
                message_type = ctx.message_type(),
                violations = violations.len(),
                "message rejected"
            );
            return Err(DispatchError::ValidationFailed(violations));
        }
        next.run(ctx).await
    }
}

//! Audit trail of dispatches.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::context::CqrsExecutionContext;
use crate::error::DispatchError;
use crate::pipeline::{Middleware, Next, Output};

/// Logs the outcome of every dispatch on the `tessera::audit` target.
///
/// Records identity, message type, outcome and duration. The message itself
/// is never logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditMiddleware;

#[async_trait]
impl Middleware for AuditMiddleware {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn handle(
        &self,
        ctx: &mut CqrsExecutionContext,
        next: Next<'_>,
    ) -> Result<Output, DispatchError> {
        let result = next.run(ctx).await;
        let duration_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(_) => info!(
                target: "tessera::audit",
                kind = ctx.kind().as_str(),
                message_type = ctx.message_type(),
                tenant_id = ctx.tenant_id(),
                user_id = ctx.user_id(),
                request_id = ctx.request_id(),
                started_at = %ctx.started_at(),
                duration_ms,
                outcome = "success",
                "dispatch completed"
            ),
            Err(err) => warn!(
                target: "tessera::audit",
                kind = ctx.kind().as_str(),
                message_type = ctx.message_type(),
                tenant_id = ctx.tenant_id(),
                user_id = ctx.user_id(),
                request_id = ctx.request_id(),
                started_at = %ctx.started_at(),
                duration_ms,
                outcome = "failure",
                error_kind = err.kind(),
                "dispatch failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::context::{ExecutionContext, Identity};
    use tessera_core::error::DomainError;

    use super::*;
    use crate::bus::CommandBus;
    use crate::message::{Command, CommandHandler, Message};
    use crate::pipeline::Pipeline;

    #[derive(Debug, Clone)]
    struct ChargeCard {
        fail: bool,
    }

    impl Message for ChargeCard {
        fn message_type(&self) -> &'static str {
            Self::TYPE
        }
    }

    impl Command for ChargeCard {
        const TYPE: &'static str = "ChargeCard";
        type Output = u32;
    }

    struct Handler;

    #[async_trait]
    impl CommandHandler<ChargeCard> for Handler {
        async fn handle(
            &self,
            _ctx: &ExecutionContext,
            command: ChargeCard,
        ) -> Result<u32, DispatchError> {
            if command.fail {
                return Err(DomainError::Validation("card declined".into()).into());
            }
            Ok(42)
        }
    }

    fn bus() -> CommandBus {
        let mut bus = CommandBus::new(Pipeline::builder().with(AuditMiddleware).build());
        bus.register::<ChargeCard, _>(Handler).unwrap();
        bus
    }

    #[tokio::test]
    async fn test_audit_passes_results_through_unchanged() {
        let ctx = ExecutionContext::new(Identity::default());

        let ok = bus().execute(&ctx, ChargeCard { fail: false }).await;
        let err = bus().execute(&ctx, ChargeCard { fail: true }).await;

        assert_eq!(ok.unwrap(), 42);
        assert_eq!(err.unwrap_err().kind(), "validation_error");
    }
}

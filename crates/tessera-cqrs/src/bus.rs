//! Command bus and query bus.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tessera_core::clock::{SharedClock, SystemClock};
use tessera_core::context::ExecutionContext;
use tracing::debug;

use crate::context::{CqrsExecutionContext, MessageKind};
use crate::error::DispatchError;
use crate::message::{Command, CommandHandler, Message, Query, QueryHandler};
use crate::pipeline::{Endpoint, Output, Pipeline};

/// Handlers keyed by message type. Each entry holds an
/// `Arc<dyn CommandHandler<C>>` or `Arc<dyn QueryHandler<Q>>`.
#[derive(Default)]
struct HandlerRegistry {
    handlers: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl HandlerRegistry {
    fn insert<T: Any + Send + Sync>(
        &mut self,
        message_type: &'static str,
        handler: T,
    ) -> Result<(), DispatchError> {
        if self.handlers.contains_key(message_type) {
            return Err(DispatchError::DuplicateRegistration(message_type.to_owned()));
        }
        self.handlers.insert(message_type, Box::new(handler));
        Ok(())
    }

    fn get<T: Any + Clone>(&self, message_type: &'static str) -> Result<T, DispatchError> {
        self.handlers
            .get(message_type)
            .and_then(|handler| handler.downcast_ref::<T>())
            .cloned()
            .ok_or_else(|| DispatchError::HandlerNotFound(message_type.to_owned()))
    }

    fn contains(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    fn types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

async fn dispatch<T: Send + 'static>(
    pipeline: &Pipeline,
    clock: &SharedClock,
    kind: MessageKind,
    ctx: &ExecutionContext,
    message: Arc<dyn Message>,
    endpoint: Endpoint,
) -> Result<T, DispatchError> {
    let message_type = message.message_type();
    debug!(
        message_type,
        kind = kind.as_str(),
        tenant_id = ctx.tenant_id(),
        request_id = ctx.request_id(),
        "dispatching"
    );
    let exec = CqrsExecutionContext::new(kind, message, ctx.clone(), clock.now());
    let output: Output = pipeline.run(exec, endpoint).await?;
    output
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| DispatchError::UnexpectedResult(message_type.to_owned()))
}

/// Routes each command to its single handler through the pipeline.
pub struct CommandBus {
    registry: HandlerRegistry,
    pipeline: Pipeline,
    clock: SharedClock,
}

impl fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBus")
            .field("handlers", &self.registry.types())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl CommandBus {
    /// Creates a bus with no handlers.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            registry: HandlerRegistry::default(),
            pipeline,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock that stamps dispatch start times.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Registers the handler for `C`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::DuplicateRegistration` when `C::TYPE` already
    /// has a handler.
    pub fn register<C, H>(&mut self, handler: H) -> Result<(), DispatchError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let handler: Arc<dyn CommandHandler<C>> = Arc::new(handler);
        self.registry.insert(C::TYPE, handler)?;
        debug!(message_type = C::TYPE, "command handler registered");
        Ok(())
    }

    /// Whether `message_type` has a handler.
    #[must_use]
    pub fn is_registered(&self, message_type: &str) -> bool {
        self.registry.contains(message_type)
    }

    /// Executes `command` for the flow in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::HandlerNotFound` when nothing handles `C`,
    /// or the error of the middleware or handler that failed.
    pub async fn execute<C: Command>(
        &self,
        ctx: &ExecutionContext,
        command: C,
    ) -> Result<C::Output, DispatchError> {
        let handler = self.registry.get::<Arc<dyn CommandHandler<C>>>(C::TYPE)?;
        let message: Arc<dyn Message> = Arc::new(command.clone());
        let endpoint: Endpoint = Box::new(move |ctx: ExecutionContext| {
            Box::pin(async move {
                let output = handler.handle(&ctx, command).await?;
                Ok(Box::new(output) as Output)
            })
        });
        dispatch(&self.pipeline, &self.clock, MessageKind::Command, ctx, message, endpoint).await
    }
}

/// Routes each query to its single handler through the pipeline.
pub struct QueryBus {
    registry: HandlerRegistry,
    pipeline: Pipeline,
    clock: SharedClock,
}

impl fmt::Debug for QueryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBus")
            .field("handlers", &self.registry.types())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl QueryBus {
    /// Creates a bus with no handlers.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            registry: HandlerRegistry::default(),
            pipeline,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock that stamps dispatch start times.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Registers the handler for `Q`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::DuplicateRegistration` when `Q::TYPE` already
    /// has a handler.
    pub fn register<Q, H>(&mut self, handler: H) -> Result<(), DispatchError>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        let handler: Arc<dyn QueryHandler<Q>> = Arc::new(handler);
        self.registry.insert(Q::TYPE, handler)?;
        debug!(message_type = Q::TYPE, "query handler registered");
        Ok(())
    }

    /// Whether `message_type` has a handler.
    #[must_use]
    pub fn is_registered(&self, message_type: &str) -> bool {
        self.registry.contains(message_type)
    }

    /// Answers `query` for the flow in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::HandlerNotFound` when nothing handles `Q`,
    /// or the error of the middleware or handler that failed.
    pub async fn execute<Q: Query>(
        &self,
        ctx: &ExecutionContext,
        query: Q,
    ) -> Result<Q::Output, DispatchError> {
        let handler = self.registry.get::<Arc<dyn QueryHandler<Q>>>(Q::TYPE)?;
        let message: Arc<dyn Message> = Arc::new(query.clone());
        let endpoint: Endpoint = Box::new(move |ctx: ExecutionContext| {
            Box::pin(async move {
                let output = handler.handle(&ctx, query).await?;
                Ok(Box::new(output) as Output)
            })
        });
        dispatch(&self.pipeline, &self.clock, MessageKind::Query, ctx, message, endpoint).await
    }
}

//! Middleware chain around a handler.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tessera_core::context::ExecutionContext;

use crate::context::CqrsExecutionContext;
use crate::error::DispatchError;

/// Type-erased result of a dispatch. The bus downcasts it to the handler's
/// output type.
pub type Output = Box<dyn Any + Send>;

/// The innermost step: invokes the handler.
pub(crate) type Endpoint =
    Box<dyn FnOnce(ExecutionContext) -> BoxFuture<'static, Result<Output, DispatchError>> + Send>;

/// One cross-cutting step of the pipeline.
///
/// A middleware may call [`Next::run`] and return or transform its result,
/// return early without calling it (everything downstream, the handler
/// included, is skipped), or fail and abort the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Runs this step.
    ///
    /// # Errors
    ///
    /// Returns the error that aborts the dispatch.
    async fn handle(
        &self,
        ctx: &mut CqrsExecutionContext,
        next: Next<'_>,
    ) -> Result<Output, DispatchError>;
}

/// The rest of the chain after the current middleware.
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    endpoint: Endpoint,
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Next<'_> {
    /// Runs the remaining middleware and then the handler.
    ///
    /// # Errors
    ///
    /// Returns whatever error the downstream chain produced.
    pub async fn run(self, ctx: &mut CqrsExecutionContext) -> Result<Output, DispatchError> {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middleware: rest,
                    endpoint: self.endpoint,
                };
                current.handle(ctx, next).await
            }
            None => (self.endpoint)(ctx.execution_context().clone()).await,
        }
    }
}

/// An ordered middleware chain plus an optional per-dispatch timeout.
#[derive(Clone, Default)]
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    timeout: Option<Duration>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Pipeline {
    /// A pipeline without middleware or timeout.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Names of the middleware, outermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) async fn run(
        &self,
        mut ctx: CqrsExecutionContext,
        endpoint: Endpoint,
    ) -> Result<Output, DispatchError> {
        let endpoint = match self.timeout {
            Some(limit) => bounded(endpoint, limit, ctx.message_type()),
            None => endpoint,
        };
        let chain = Next {
            middleware: &self.middleware,
            endpoint,
        };
        chain.run(&mut ctx).await
    }
}

/// Bounds the handler call only, so every middleware still sees the
/// `Timeout` error and can record it.
fn bounded(endpoint: Endpoint, limit: Duration, message_type: &'static str) -> Endpoint {
    Box::new(move |ctx| {
        Box::pin(async move {
            tokio::time::timeout(limit, endpoint(ctx))
                .await
                .map_err(|_| DispatchError::Timeout {
                    message_type: message_type.to_owned(),
                    after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?
        })
    })
}

/// Builds a [`Pipeline`]. Middleware run in the order they are added.
#[derive(Default)]
pub struct PipelineBuilder {
    middleware: Vec<Arc<dyn Middleware>>,
    timeout: Option<Duration>,
}

impl PipelineBuilder {
    /// Appends `middleware` inside everything added before it.
    #[must_use]
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware.
    #[must_use]
    pub fn with_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Bounds each dispatch; `None` disables the limit.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            middleware: self.middleware,
            timeout: self.timeout,
        }
    }
}

//! Command/query dispatch for Tessera bounded contexts.
//!
//! Each command or query type maps to exactly one handler, registered
//! explicitly at startup. Dispatch runs through a [`Pipeline`] of
//! [`Middleware`]; the first middleware added is the outermost and any of
//! them may short-circuit the chain.

pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod extensions;
pub mod message;
pub mod middleware;
pub mod pipeline;

pub use bus::{CommandBus, QueryBus};
pub use config::PipelineConfig;
pub use context::{CqrsExecutionContext, MessageKind};
pub use error::DispatchError;
pub use extensions::Extensions;
pub use message::{Command, CommandHandler, FieldViolation, Message, Query, QueryHandler};
pub use pipeline::{Middleware, Next, Output, Pipeline, PipelineBuilder};

//! Standard middleware, in the order [`PipelineConfig`](crate::PipelineConfig)
//! installs them.

pub mod audit;
pub mod authorization;
pub mod metrics;
pub mod validation;

pub use audit::AuditMiddleware;
pub use authorization::{
    Action, AuthenticatedOnly, AuthorizationMiddleware, PermissionChecker,
    StaticPermissionChecker, action_for,
};
pub use metrics::{
    DispatchOutcome, InMemoryMetricsCollector, MetricsCollector, MetricsMiddleware,
    TracingMetricsCollector,
};
pub use validation::ValidationMiddleware;

//! Pipeline configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::middleware::{
    AuditMiddleware, AuthorizationMiddleware, AuthenticatedOnly, MetricsCollector,
    MetricsMiddleware, PermissionChecker, TracingMetricsCollector, ValidationMiddleware,
};
use crate::pipeline::{Pipeline, PipelineBuilder};

/// Default per-dispatch limit.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Which standard middleware to install, and with which collaborators.
///
/// Enabled middleware are installed in the order validation, authorization,
/// audit, metrics.
#[derive(Clone)]
pub struct PipelineConfig {
    pub validation: bool,
    pub authorization: bool,
    pub audit: bool,
    pub metrics: bool,
    /// Defaults to [`AuthenticatedOnly`].
    pub permission_checker: Option<Arc<dyn PermissionChecker>>,
    /// Defaults to [`TracingMetricsCollector`].
    pub metrics_collector: Option<Arc<dyn MetricsCollector>>,
    /// `None` disables the limit.
    pub dispatch_timeout: Option<Duration>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("validation", &self.validation)
            .field("authorization", &self.authorization)
            .field("audit", &self.audit)
            .field("metrics", &self.metrics)
            .field("permission_checker", &self.permission_checker.is_some())
            .field("metrics_collector", &self.metrics_collector.is_some())
            .field("dispatch_timeout", &self.dispatch_timeout)
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validation: true,
            authorization: true,
            audit: true,
            metrics: true,
            permission_checker: None,
            metrics_collector: None,
            dispatch_timeout: Some(DEFAULT_DISPATCH_TIMEOUT),
        }
    }
}

impl PipelineConfig {
    /// Every standard middleware off and no timeout.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            validation: false,
            authorization: false,
            audit: false,
            metrics: false,
            permission_checker: None,
            metrics_collector: None,
            dispatch_timeout: None,
        }
    }

    #[must_use]
    pub fn with_permission_checker(mut self, checker: Arc<dyn PermissionChecker>) -> Self {
        self.permission_checker = Some(checker);
        self
    }

    #[must_use]
    pub fn with_metrics_collector(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.metrics_collector = Some(collector);
        self
    }

    /// A builder holding the enabled standard middleware, to which custom
    /// middleware can be appended.
    #[must_use]
    pub fn builder(&self) -> PipelineBuilder {
        let mut builder = Pipeline::builder().timeout(self.dispatch_timeout);
        if self.validation {
            builder = builder.with(ValidationMiddleware);
        }
        if self.authorization {
            let checker = self
                .permission_checker
                .clone()
                .unwrap_or_else(|| Arc::new(AuthenticatedOnly) as Arc<dyn PermissionChecker>);
            builder = builder.with(AuthorizationMiddleware::new(checker));
        }
        if self.audit {
            builder = builder.with(AuditMiddleware);
        }
        if self.metrics {
            let collector = self
                .metrics_collector
                .clone()
                .unwrap_or_else(|| Arc::new(TracingMetricsCollector) as Arc<dyn MetricsCollector>);
            builder = builder.with(MetricsMiddleware::new(collector));
        }
        builder
    }

    #[must_use]
    pub fn build(&self) -> Pipeline {
        self.builder().build()
    }
}

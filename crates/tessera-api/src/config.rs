//! Server configuration read from the environment.

use std::time::Duration;

use tessera_cqrs::PipelineConfig;
use tessera_messaging::PublisherConfig;

use crate::error::AppError;

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string. In-memory storage when absent.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Deployment environment name, e.g. `development` or `production`.
    pub app_env: String,
    pub publisher_enabled: bool,
    pub publisher: PublisherConfig,
    pub pipeline: PipelineConfig,
    /// Collector endpoint for span export. Spans are not exported when absent.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first variable with an invalid
    /// value.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first variable with an invalid
    /// value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let app_env = var("APP_ENV").unwrap_or_else(|| "development".to_owned());
        let production = matches!(app_env.to_ascii_lowercase().as_str(), "production" | "prod");

        let publisher_defaults = PublisherConfig::default();
        let publisher = PublisherConfig {
            poll_interval: millis(&var, "OUTBOX_POLL_INTERVAL_MS", publisher_defaults.poll_interval)?,
            batch_size: parse(&var, "OUTBOX_BATCH_SIZE", publisher_defaults.batch_size)?,
            max_backoff: millis(&var, "OUTBOX_MAX_BACKOFF_MS", publisher_defaults.max_backoff)?,
        };
        if publisher.batch_size == 0 {
            return Err(AppError::Config(
                "OUTBOX_BATCH_SIZE must be greater than zero".to_owned(),
            ));
        }
        if publisher.poll_interval.is_zero() {
            return Err(AppError::Config(
                "OUTBOX_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        let timeout_ms: u64 = parse(&var, "DISPATCH_TIMEOUT_MS", 30_000)?;
        let pipeline = PipelineConfig {
            validation: flag(&var, "PIPELINE_VALIDATION", true)?,
            authorization: flag(&var, "PIPELINE_AUTHORIZATION", true)?,
            audit: flag(&var, "PIPELINE_AUDIT", true)?,
            metrics: flag(&var, "PIPELINE_METRICS", true)?,
            dispatch_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            ..PipelineConfig::default()
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse(&var, "PORT", 3000)?,
            publisher_enabled: flag(&var, "OUTBOX_PUBLISHER_ENABLED", !production)?,
            app_env,
            publisher,
            pipeline,
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }
}

fn parse<T>(var: impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{name} must be a valid number: {e}"))),
        None => Ok(default),
    }
}

fn millis(
    var: impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration, AppError> {
    match var(name) {
        Some(_) => parse::<u64>(var, name, 0).map(Duration::from_millis),
        None => Ok(default),
    }
}

fn flag(var: impl Fn(&str) -> Option<String>, name: &str, default: bool) -> Result<bool, AppError> {
    match var(name).map(|raw| raw.to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::Config(format!(
                "{name} must be a boolean, got {raw:?}"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_use_memory_storage_and_enable_everything() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.database_url, None);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.app_env, "development");
        assert!(config.publisher_enabled);
        assert_eq!(config.publisher, PublisherConfig::default());
        assert!(config.pipeline.validation && config.pipeline.authorization);
        assert!(config.pipeline.audit && config.pipeline.metrics);
        assert_eq!(config.pipeline.dispatch_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.otlp_endpoint, None);
    }

    #[test]
    fn test_publisher_defaults_off_in_production() {
        let config = config_from(&[("APP_ENV", "Production")]).unwrap();

        assert!(!config.publisher_enabled);
    }

    #[test]
    fn test_explicit_publisher_flag_wins_over_environment() {
        let config =
            config_from(&[("APP_ENV", "prod"), ("OUTBOX_PUBLISHER_ENABLED", "true")]).unwrap();

        assert!(config.publisher_enabled);
    }

    #[test]
    fn test_tunables_are_read() {
        // Arrange
        let vars = [
            ("DATABASE_URL", "postgres://localhost/tessera"),
            ("PORT", "8080"),
            ("OUTBOX_POLL_INTERVAL_MS", "250"),
            ("OUTBOX_BATCH_SIZE", "10"),
            ("OUTBOX_MAX_BACKOFF_MS", "5000"),
            ("DISPATCH_TIMEOUT_MS", "0"),
            ("PIPELINE_AUDIT", "off"),
        ];

        // Act
        let config = config_from(&vars).unwrap();

        // Assert
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/tessera"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.publisher.poll_interval, Duration::from_millis(250));
        assert_eq!(config.publisher.batch_size, 10);
        assert_eq!(config.publisher.max_backoff, Duration::from_secs(5));
        assert_eq!(config.pipeline.dispatch_timeout, None);
        assert!(!config.pipeline.audit);
        assert!(config.pipeline.metrics);
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        for (name, value) in [
            ("PORT", "eighty"),
            ("OUTBOX_BATCH_SIZE", "0"),
            ("PIPELINE_METRICS", "maybe"),
            ("DISPATCH_TIMEOUT_MS", "-1"),
        ] {
            let err = config_from(&[(name, value)]).unwrap_err();

            assert!(
                matches!(&err, AppError::Config(msg) if msg.contains(name)),
                "{name}: {err}"
            );
        }
    }
}

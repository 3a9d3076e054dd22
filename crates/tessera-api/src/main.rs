//! Tessera API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tessera_api::bootstrap::{self, Storage};
use tessera_api::config::AppConfig;
use tessera_api::error::AppError;
use tessera_api::{routes, telemetry};
use tessera_core::clock::{SharedClock, SystemClock};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    info!(app_env = %config.app_env, "starting Tessera API server");

    let clock: SharedClock = Arc::new(SystemClock);
    let storage = match config.database_url.as_deref() {
        Some(url) => Storage::postgres(url, &clock).await?,
        None => {
            warn!("DATABASE_URL not set, using in-memory storage");
            Storage::in_memory(&clock)
        }
    };

    let app = bootstrap::build(storage, clock, &config.pipeline, config.publisher)?;
    let publisher = config
        .publisher_enabled
        .then(|| app.publisher.clone().spawn());
    if publisher.is_none() {
        info!("outbox publisher disabled");
    }

    let router = routes::app(app.state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    if let Some(handle) = publisher {
        handle.shutdown().await?;
    }
    app.detach();
    telemetry.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

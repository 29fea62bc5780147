//! Daemon startup: engine, orchestrator, HTTP API and graceful shutdown.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use tamer_core::{
    create_engine, load_config, validate_config, FeedFetcher, HttpFeedFetcher, Orchestrator,
    SqliteStatsStore, StatsStore,
};

use crate::api::create_router;
use crate::state::AppState;

pub async fn serve(config_path: &Path) -> Result<()> {
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Engine backend: {}", config.engine.backend.as_str());
    info!("Database path: {:?}", config.database.path);
    info!("Backup directory: {:?}", config.backup.dir);

    let engine = create_engine(&config.engine, &config.session)
        .await
        .context("Failed to initialize transfer engine")?;
    info!("Using transfer engine: {}", engine.name());

    let fetcher: Arc<dyn FeedFetcher> = Arc::new(
        HttpFeedFetcher::new(Duration::from_secs(config.rss.fetch_timeout_secs))
            .context("Failed to create feed fetcher")?,
    );

    let stats_store: Arc<dyn StatsStore> = Arc::new(
        SqliteStatsStore::new(&config.database.path).context("Failed to open stats database")?,
    );
    info!("Stats store initialized");

    let orchestrator = Arc::new(
        Orchestrator::new(&config, engine, fetcher, Some(stats_store))
            .await
            .context("Failed to create orchestrator")?,
    );
    orchestrator.start().await;
    info!("Orchestrator started");

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&orchestrator)));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    info!("Stopping orchestrator...");
    orchestrator.stop().await;
    info!("Orchestrator stopped");

    served
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

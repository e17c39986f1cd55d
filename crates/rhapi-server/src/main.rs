//! RHAPI Server - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use rhapi_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rhapi_server::{
    api::{create_router, AppState},
    catalog::{Catalog, HttpPageFetcher},
    config::Config,
    index::{IndexWriter, LocationIndex},
    worker::{spawn_watchdog, WorkerSupervisor},
};

/// Catalog front for a supervised scraper worker
#[derive(Debug, Parser)]
#[command(name = "rhapi-server", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "RHAPI_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::new(
        "info,rhapi_server=debug,tower_http=info,sqlx=warn",
        "rhapi-server",
    )
    .with_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting RHAPI Server");

    let config = Config::load(cli.config.as_deref())?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Location index and its writer
    let index = Arc::new(
        LocationIndex::open(&config.index.path, config.index.read_timeout())
            .await
            .context("Failed to open location index")?,
    );
    let (writer, writer_handle) = IndexWriter::spawn(Arc::clone(&index), config.index.queue_capacity);

    // Worker
    let supervisor = Arc::new(WorkerSupervisor::new(config.worker.clone()));
    match supervisor.start().await {
        Ok(pid) => info!(pid, "Worker started"),
        Err(e) => error!(error = %e, "Worker failed to start; the watchdog will retry"),
    }

    let shutdown = CancellationToken::new();
    let watchdog = spawn_watchdog(Arc::clone(&supervisor), shutdown.clone());

    let fetcher = HttpPageFetcher::new(config.worker.data_url.clone(), config.fetch.page_timeout())
        .context("Failed to build worker HTTP client")?;
    let catalog = Arc::new(Catalog::new(
        Arc::clone(&supervisor),
        Arc::new(fetcher),
        Arc::clone(&index),
        writer.clone(),
        &config.fetch,
    ));

    let state = AppState::new(catalog, config.auth.api_key.as_deref());
    let app = create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Cleanup: watchdog first so it does not restart the worker we are stopping
    let cleanup = async {
        shutdown.cancel();
        let _ = watchdog.await;
        supervisor.stop().await;
        writer.flush().await;
    };
    let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
    if tokio::time::timeout(grace, cleanup).await.is_err() {
        warn!(timeout_secs = grace.as_secs(), "Shutdown cleanup timed out");
    }

    drop(writer);
    let _ = tokio::time::timeout(grace, writer_handle).await;
    index.close().await;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    shutdown.cancel();
}

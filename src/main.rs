//! ricebox -- food catalog backend with an object-storage facade.
//!
//! Storage is initialized before the listener binds: a missing credential or
//! an unreachable bucket aborts startup instead of surfacing on the first
//! request.  SIGTERM/SIGINT stop accepting connections and give in-flight
//! requests `server.shutdown_timeout` seconds to finish.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

/// Command-line arguments for the ricebox server.
#[derive(Parser, Debug)]
#[command(
    name = "ricebox",
    version,
    about = "Food catalog backend with object storage and an image proxy"
)]
struct Cli {
    /// Path to an optional YAML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

fn init_tracing(logging: &ricebox::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ricebox::config::load(cli.config.as_deref())?;
    init_tracing(&config.logging);
    match cli.config.as_deref() {
        Some(path) => info!("Configuration loaded from {}", path),
        None => info!("No configuration file given, using defaults and environment"),
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        ricebox::metrics::init_metrics()?;
        ricebox::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // Fail fast: no listener until the bucket answers.
    let storage = ricebox::storage::StorageContext::new(config.storage.clone());
    storage.init().await?;

    let catalog: Arc<dyn ricebox::catalog::CatalogStore> =
        Arc::new(ricebox::catalog::MemoryCatalogStore::new());

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(ricebox::AppState {
        config,
        storage: Arc::new(storage),
        catalog,
    });

    let app = ricebox::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("ricebox listening on {}", bind_addr);

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let mut graceful_rx = stop_rx.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = graceful_rx.changed().await;
    });

    let mut deadline_rx = stop_rx;
    let deadline = async move {
        if deadline_rx.changed().await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        res = server => res?,
        _ = deadline => {
            warn!(
                "In-flight requests still running after {}s, exiting",
                shutdown_timeout.as_secs()
            );
        }
    }

    info!("ricebox shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use feedback_vault::{
    build_router, config::AppConfig, state::AppState, store::MemoryStore,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "feedback_vault")]
#[command(about = "Customer feedback service with backups and change streams")]
struct Cli {
    /// Overrides APP_HOST.
    #[arg(long)]
    host: Option<String>,
    /// Overrides APP_PORT.
    #[arg(long)]
    port: Option<u16>,
    /// Overrides BACKUP_DIR.
    #[arg(long)]
    backup_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("failed to load application configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(backup_dir) = cli.backup_dir {
        config.backup_dir = backup_dir;
    }

    let store = Arc::new(MemoryStore::with_feed_capacity(config.feed_capacity));
    let app = build_router(AppState::new(store.clone(), config.service_options()));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        address = %addr,
        backup_dir = %config.backup_dir.display(),
        "feedback service started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(store.clone()))
        .await
        .context("server error")?;

    info!("feedback service stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("feedback_vault=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Waits for a termination signal, then closes the change feed so open
/// streams finish and the server can drain.
async fn shutdown_signal(store: Arc<MemoryStore>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
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

    info!("shutdown requested, closing change feed");
    store.shutdown();
}

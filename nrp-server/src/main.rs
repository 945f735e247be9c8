//! nrp-server - NGO monthly reporting service
//!
//! Accepts single reports and bulk CSV uploads, ingests uploads in
//! background jobs that clients poll or follow over SSE, and serves
//! month-level dashboard aggregates.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nrp_common::events::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nrp_server::config::{ServerConfig, ServerOverrides};
use nrp_server::db::{SqliteJobLedger, SqliteReportStore};
use nrp_server::AppState;

/// Event bus capacity per subscriber
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for nrp-server
#[derive(Parser, Debug)]
#[command(name = "nrp-server")]
#[command(about = "NGO monthly reporting service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "NRP_PORT")]
    port: Option<u16>,

    /// Interface to bind
    #[arg(short, long, env = "NRP_BIND")]
    bind: Option<String>,

    /// Data folder holding the database and uploads
    #[arg(short, long, env = "NRP_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Directory for uploaded CSV files
    #[arg(long, env = "NRP_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// CORS allowed origin (`*` for any)
    #[arg(long, env = "NRP_ALLOWED_ORIGIN")]
    allowed_origin: Option<String>,

    /// TOML config file (default: ~/.config/nrp/config.toml)
    #[arg(short, long, env = "NRP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ServerOverrides {
        ServerOverrides {
            port: self.port,
            bind_address: self.bind.clone(),
            root_folder: self.root_folder.clone(),
            upload_dir: self.upload_dir.clone(),
            allowed_origin: self.allowed_origin.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = nrp_common::config::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    let config = ServerConfig::resolve(&args.overrides(), &toml_config)
        .context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    let default_filter = format!(
        "nrp_server={level},nrp_common={level},tower_http={level}",
        level = config.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting nrp-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    config
        .root_folder
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", config.root_folder.path().display());

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload dir {}", config.upload_dir.display()))?;
    info!("Upload dir: {}", config.upload_dir.display());

    let db_path = config.root_folder.database_path();
    let pool = nrp_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let ledger = Arc::new(SqliteJobLedger::new(pool.clone()));
    let stale = ledger
        .fail_stale_jobs()
        .await
        .context("Failed to clean up interrupted jobs")?;
    if !stale.is_empty() {
        warn!("Marked {} interrupted ingest job(s) as failed", stale.len());
    }

    let reports = Arc::new(SqliteReportStore::new(pool));
    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

    let state = AppState::new(reports, ledger, event_bus, config.upload_dir.clone());
    if let Err(e) = state.orchestrator.remove_stale_files(&stale).await {
        warn!("Failed to clean up upload directory {}: {}", config.upload_dir.display(), e);
    }
    nrp_server::spawn_failure_tracker(&state);

    let app = nrp_server::build_router(state, &config.router_config());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

//! seathunter-api - presentation API for Seat Hunter
//!
//! Serves car recommendations and the real-time congestion report from the
//! store and snapshot folder maintained by seathunter-etl.

use anyhow::{Context, Result};
use clap::Parser;
use seathunter_api::{build_router, AppState};
use seathunter_common::config::{resolve_config_path, resolve_root_folder, DataLayout, TomlConfig};
use seathunter_common::db;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Command-line arguments for seathunter-api
#[derive(Parser, Debug)]
#[command(name = "seathunter-api")]
#[command(about = "Seat Hunter presentation API")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data folder holding the database and snapshots
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on (default: configured api.port)
    #[arg(short, long, env = "SEATHUNTER_API_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = TomlConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "{},tower_http=info",
                    config.logging.level
                ))
            }),
        )
        .init();

    info!("Starting seathunter-api v{}", env!("CARGO_PKG_VERSION"));
    if !config_path.exists() {
        warn!("Config file {} not found, using defaults", config_path.display());
    }

    let layout = DataLayout::new(resolve_root_folder(args.root_folder.as_deref(), &config));
    let db_path = layout.database_path();
    info!("Database path: {}", db_path.display());

    let pool = db::init_database(&db_path)
        .await
        .context("Failed to open database")?;
    info!("✓ Connected to database");

    let state = AppState::new(pool, layout.snapshot_dir(), config.scoring.reference_hour);
    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port = args.port.unwrap_or(config.api.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("seathunter-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

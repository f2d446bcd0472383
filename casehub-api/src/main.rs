//! casehub-api - Main entry point
//!
//! HTTP backend for the teaching-case platform. Serves the session
//! catalog, auth, subscriptions and payments, assessments, observations,
//! playback progress, and reviews on one port.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use casehub_api::{build_router, AppState};
use casehub_common::auth::{load_signing_key, TokenCodec};
use casehub_common::config::Config;
use casehub_common::db::init::init_database;

/// Command-line arguments for casehub-api
#[derive(Parser, Debug)]
#[command(name = "casehub-api")]
#[command(about = "CaseHub content platform backend")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "CASEHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port from the config file
    #[arg(short, long, env = "CASEHUB_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "casehub_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("Starting casehub-api v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.server.database_path.display());

    let db = init_database(&config.server.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    let signing_key = load_signing_key(&db)
        .await
        .context("Failed to load token signing key")?;
    let tokens = TokenCodec::new(signing_key);

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .context("Invalid server.host in config")?;
    let addr = SocketAddr::new(host, config.server.port);

    let state = AppState::new(db, tokens, config);
    let app = build_router(state);

    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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

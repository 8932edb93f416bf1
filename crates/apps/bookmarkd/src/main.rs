//! bookmarkd - personal bookmark manager server
//!
//! Serves the bookmark REST API and, optionally, the browser front end.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bookmarks::{BookmarkService, ServiceConfig};
use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;

mod rest;

use rest::AppState;

/// Personal bookmark manager server
#[derive(Debug, Parser)]
#[command(name = "bookmarkd", version)]
struct Args {
    /// Configuration file (overrides BOOKMARKS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cfg = ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let index = cfg.index_config()?;

    let store = bookmarks::storage::open(&index)?;
    let service = BookmarkService::new(store);
    let state = Arc::new(AppState::new(
        service.clone(),
        cfg.server.request_timeout(),
    ));
    let app = rest::router(state, cfg.server.static_dir.as_deref());

    let listener = TcpListener::bind(cfg.server.address)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.address))?;
    info!("bookmarkd listening on {}", cfg.server.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    service.close()?;
    info!("Index closed, exiting");
    Ok(())
}

//! Cache file server - static files served through the in-memory file cache
//!
//! Every file is read from disk once and served from memory until its
//! modification time changes.

mod error;
mod server;
mod types;

use crate::error::{Result, ServerError};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ServerConfig;
use cachefs::{CacheConfig, CacheFs, OsFileStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("cachefs_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting cache file server...");

    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Stat TTL: {} ms", config.stat_ttl_ms);

    let cache = CacheFs::with_store(
        config.root_dir,
        OsFileStore,
        CacheConfig {
            stat_ttl: Duration::from_millis(config.stat_ttl_ms),
        },
    );
    info!("Serving files from {:?}", cache.root());

    let state: SharedState = Arc::new(ServerState::new(cache));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ServerError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

fn load_config() -> Result<ServerConfig> {
    let defaults = ServerConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let root_dir = std::env::var("ROOT_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.root_dir);

    let stat_ttl_ms = std::env::var("STAT_TTL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.stat_ttl_ms);

    if !std::fs::metadata(&root_dir)?.is_dir() {
        return Err(ServerError::Config(format!(
            "ROOT_DIR {:?} is not a directory",
            root_dir
        )));
    }

    Ok(ServerConfig {
        port,
        root_dir,
        stat_ttl_ms,
    })
}

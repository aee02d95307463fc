//! Core types for the cache file server

use cachefs::CacheStats;
use serde::Serialize;
use std::path::PathBuf;

/// Configuration for the file server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub root_dir: PathBuf,
    /// Milliseconds a stat result may be reused before checking the file again
    pub stat_ttl_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            root_dir: PathBuf::from("./public"),
            stat_ttl_ms: 0,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

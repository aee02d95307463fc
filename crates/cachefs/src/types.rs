//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stat result for a cached file or a directory listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub reloads: u64,
}

/// Tuning for freshness checks
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// How long a memoized stat may stand in for a live one. Zero means
    /// every operation stats the file.
    pub stat_ttl: Duration,
}

//! Path-keyed registry of cache entries rooted at a directory

use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::handle::CachedFile;
use crate::store::{FileStore, OsFileStore};
use crate::types::{CacheConfig, CacheStats};
use moka::sync::Cache;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

struct Inner<S: FileStore> {
    root: PathBuf,
    store: Arc<S>,
    config: CacheConfig,
    /// Unbounded: no capacity and no expiry, entries live as long as the registry
    entries: Cache<PathBuf, Arc<CacheEntry<S>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Serves files under `root` through the cache.
///
/// Cloning is cheap and every clone shares the same entries.
pub struct CacheFs<S: FileStore = OsFileStore> {
    inner: Arc<Inner<S>>,
}

impl CacheFs<OsFileStore> {
    /// Cache files below `root` on the local filesystem
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_store(root, OsFileStore, CacheConfig::default())
    }
}

impl<S: FileStore> CacheFs<S> {
    pub fn with_store(root: impl Into<PathBuf>, store: S, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                store: Arc::new(store),
                config,
                entries: Cache::builder().build(),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Map a request path like `/css/site.css` to a path below the root.
    /// Parent components are refused rather than resolved.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.contains('\0') || name.contains('\\') {
            return Err(CacheError::InvalidPath(name.to_string()));
        }

        let mut path = self.inner.root.clone();
        for component in Path::new(name.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(CacheError::InvalidPath(name.to_string())),
            }
        }
        Ok(path)
    }

    /// Open `name` for reading. The first open of a path loads it; later
    /// opens reuse the loaded entry without touching the store.
    pub fn open(&self, name: &str) -> Result<CachedFile<S>> {
        let path = self.resolve(name)?;

        if let Some(entry) = self.inner.entries.get(&path) {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path.display(), "Cache hit");
            return Ok(CachedFile::new(entry, Some(self.clone())));
        }

        // One load per path: concurrent misses wait for the first loader and
        // share its entry or its error
        let inserted = self
            .inner
            .entries
            .entry(path.clone())
            .or_try_insert_with(|| {
                CacheEntry::load(
                    path,
                    Arc::clone(&self.inner.store),
                    self.inner.config.clone(),
                )
                .map(Arc::new)
            });

        let entry = match inserted {
            Ok(entry) => entry,
            Err(err) => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                return Err(CacheError::from(err));
            }
        };

        if entry.is_fresh() {
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            debug!(path = %entry.key().display(), "Waited for concurrent load");
        }
        Ok(CachedFile::new(entry.into_value(), Some(self.clone())))
    }

    /// Entry currently cached for an already resolved path
    pub fn get(&self, path: &Path) -> Option<Arc<CacheEntry<S>>> {
        self.inner.entries.get(path)
    }

    /// Store `entry` under `path`, replacing whatever was there
    pub fn register(&self, path: &Path, entry: Arc<CacheEntry<S>>) {
        self.inner.entries.insert(path.to_path_buf(), entry);
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.entries.run_pending_tasks();
        let reloads = self
            .inner
            .entries
            .iter()
            .map(|(_, entry)| entry.reloads())
            .sum();

        CacheStats {
            entries: self.inner.entries.entry_count(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            reloads,
        }
    }
}

impl<S: FileStore> Clone for CacheFs<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

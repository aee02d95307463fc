//! Per-path cache entry with modification-time revalidation
//!
//! An entry owns the loaded content of one path as an immutable snapshot.
//! Reloading builds a complete new snapshot and swaps it in one step, so a
//! failed reload never leaves a half-replaced entry behind, and handles that
//! still hold the previous snapshot keep reading it undisturbed.

use crate::cursor::CircularCursor;
use crate::error::Result;
use crate::handle::CachedFile;
use crate::store::{FileStore, OsFileStore};
use crate::types::{CacheConfig, FileInfo};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tracing::debug;

/// Result of comparing the live modification time with the cached one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Everything captured by one successful load
pub(crate) struct Snapshot<H> {
    pub handle: Arc<H>,
    pub mod_time: DateTime<Utc>,
    pub info: FileInfo,
    /// Master cursor, always at position 0; handles clone it
    pub cursor: CircularCursor,
    pub generation: u64,
}

/// Outcome of a freshness check that reloads when needed
pub(crate) struct Revalidated<H> {
    pub snapshot: Arc<Snapshot<H>>,
    pub info: FileInfo,
    pub reloaded: bool,
}

/// Stat result reused for up to `stat_ttl`, only against the snapshot it
/// was taken for
struct StatMemo {
    info: FileInfo,
    taken: Instant,
    generation: u64,
}

pub struct CacheEntry<S: FileStore = OsFileStore> {
    path: PathBuf,
    store: Arc<S>,
    config: CacheConfig,
    snapshot: RwLock<Arc<Snapshot<S::Handle>>>,
    last_stat: Mutex<Option<StatMemo>>,
    reload_lock: Mutex<()>,
    reloads: AtomicU64,
}

impl<S: FileStore> CacheEntry<S> {
    /// Open, stat and read `path` in full
    pub fn load(path: impl Into<PathBuf>, store: Arc<S>, config: CacheConfig) -> Result<Self> {
        let path = path.into();
        let snapshot = fetch(store.as_ref(), &path, 0)?;
        debug!(path = %path.display(), size = snapshot.cursor.size(), "Loaded file into cache");

        Ok(Self {
            path,
            store,
            config,
            snapshot: RwLock::new(Arc::new(snapshot)),
            last_stat: Mutex::new(None),
            reload_lock: Mutex::new(()),
            reloads: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time captured when the current content was loaded
    pub fn modified(&self) -> DateTime<Utc> {
        self.snapshot().mod_time
    }

    /// Number of completed loads after the first one
    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    /// A fresh cursor over the current content
    pub fn cursor(&self) -> CircularCursor {
        self.snapshot().cursor.clone()
    }

    /// Hand out a new independent read handle over the current content
    pub fn open(self: &Arc<Self>) -> CachedFile<S> {
        CachedFile::new(Arc::clone(self), None)
    }

    /// Compare the live modification time with the cached one.
    /// Does not touch the cached content.
    pub fn ensure_fresh(&self) -> Result<Freshness> {
        let snapshot = self.snapshot();
        let (freshness, _) = self.check(&snapshot)?;
        Ok(freshness)
    }

    /// Reload unconditionally. On failure the previous content stays in place.
    pub fn resynchronize(&self) -> Result<()> {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.reload_locked()?;
        Ok(())
    }

    /// Stat the file, reloading first if it changed
    pub fn stat(&self) -> Result<FileInfo> {
        Ok(self.revalidate()?.info)
    }

    /// List the directory behind this entry, reloading first if it changed
    pub fn list_directory(&self, limit: Option<usize>) -> Result<Vec<FileInfo>> {
        let revalidated = self.revalidate()?;
        self.read_dir(&revalidated.snapshot, limit)
    }

    pub(crate) fn snapshot(&self) -> Arc<Snapshot<S::Handle>> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub(crate) fn read_dir(
        &self,
        snapshot: &Snapshot<S::Handle>,
        limit: Option<usize>,
    ) -> Result<Vec<FileInfo>> {
        Ok(self.store.read_dir(&snapshot.handle, limit)?)
    }

    /// Freshness check followed, when stale, by a single reload.
    ///
    /// Concurrent callers that saw the same stale generation reload only
    /// once: whoever gets the lock second finds the generation already
    /// advanced and takes the new snapshot as is.
    pub(crate) fn revalidate(&self) -> Result<Revalidated<S::Handle>> {
        let snapshot = self.snapshot();
        let (freshness, info) = self.check(&snapshot)?;
        if freshness == Freshness::Fresh {
            return Ok(Revalidated {
                snapshot,
                info,
                reloaded: false,
            });
        }

        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let snapshot = if current.generation != snapshot.generation {
            current
        } else {
            self.reload_locked()?
        };

        Ok(Revalidated {
            info: snapshot.info.clone(),
            snapshot,
            reloaded: true,
        })
    }

    fn check(&self, snapshot: &Snapshot<S::Handle>) -> Result<(Freshness, FileInfo)> {
        let info = self.live_stat(snapshot)?;
        let freshness = if info.modified == snapshot.mod_time {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };
        Ok((freshness, info))
    }

    // The memo lock is never held across the store call, so concurrent
    // checks of one entry stat in parallel
    fn live_stat(&self, snapshot: &Snapshot<S::Handle>) -> Result<FileInfo> {
        if self.config.stat_ttl.is_zero() {
            return Ok(self.store.stat(&snapshot.handle)?);
        }

        if let Some(memo) = self.memo().as_ref() {
            if memo.generation == snapshot.generation && memo.taken.elapsed() < self.config.stat_ttl
            {
                return Ok(memo.info.clone());
            }
        }

        let info = self.store.stat(&snapshot.handle)?;
        *self.memo() = Some(StatMemo {
            info: info.clone(),
            taken: Instant::now(),
            generation: snapshot.generation,
        });
        Ok(info)
    }

    fn memo(&self) -> MutexGuard<'_, Option<StatMemo>> {
        self.last_stat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Caller holds reload_lock
    fn reload_locked(&self) -> Result<Arc<Snapshot<S::Handle>>> {
        let generation = self.snapshot().generation + 1;
        let fresh = Arc::new(fetch(self.store.as_ref(), &self.path, generation)?);

        {
            let mut slot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            *slot = Arc::clone(&fresh);
        }
        *self.memo() = None;
        self.reloads.fetch_add(1, Ordering::Relaxed);

        debug!(
            path = %self.path.display(),
            generation,
            size = fresh.cursor.size(),
            "Reloaded changed file"
        );
        Ok(fresh)
    }
}

impl<S: FileStore> fmt::Debug for CacheEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("CacheEntry")
            .field("path", &self.path)
            .field("mod_time", &snapshot.mod_time)
            .field("size", &snapshot.cursor.size())
            .field("generation", &snapshot.generation)
            .finish()
    }
}

fn fetch<S: FileStore>(store: &S, path: &Path, generation: u64) -> Result<Snapshot<S::Handle>> {
    let handle = store.open(path)?;
    // The mod time must describe the bytes read below, so it comes from the
    // open handle, not the path
    let info = store.stat_open(&handle)?;
    let data = store.read_all(&handle)?;

    Ok(Snapshot {
        handle: Arc::new(handle),
        mod_time: info.modified,
        info,
        cursor: CircularCursor::new(data),
        generation,
    })
}

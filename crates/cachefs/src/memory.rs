//! In-memory [`FileStore`] with call counters, for tests

use crate::store::FileStore;
use crate::types::FileInfo;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

struct MemFile {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    files: Mutex<HashMap<PathBuf, MemFile>>,
    dirs: Mutex<Vec<PathBuf>>,
    pub opens: AtomicUsize,
    pub stats: AtomicUsize,
    pub reads: AtomicUsize,
    pub fail_reads: AtomicBool,
    /// How long each `stat` blocks
    pub stat_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    /// Most `stat` calls seen running at once
    pub peak_stats: AtomicUsize,
}

pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

impl MemoryStore {
    pub fn put(&self, path: impl Into<PathBuf>, data: &[u8], modified_secs: i64) {
        self.files.lock().unwrap().insert(
            path.into(),
            MemFile {
                data: data.to_vec(),
                modified: at(modified_secs),
            },
        );
    }

    pub fn mkdir(&self, path: impl Into<PathBuf>) {
        self.dirs.lock().unwrap().push(path.into());
    }

    pub fn remove(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().iter().any(|d| d == path)
    }

    fn stat_now(&self, handle: &Path) -> io::Result<FileInfo> {
        let name = handle
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.is_dir(handle) {
            return Ok(FileInfo {
                name,
                size: 0,
                modified: at(0),
                is_dir: true,
            });
        }
        let files = self.files.lock().unwrap();
        let file = files.get(handle).ok_or_else(|| Self::not_found(handle))?;
        Ok(FileInfo {
            name,
            size: file.data.len() as u64,
            modified: file.modified,
            is_dir: false,
        })
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, path.display().to_string())
    }
}

impl FileStore for MemoryStore {
    type Handle = PathBuf;

    fn open(&self, path: &Path) -> io::Result<PathBuf> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.is_dir(path) || self.files.lock().unwrap().contains_key(path) {
            Ok(path.to_path_buf())
        } else {
            Err(Self::not_found(path))
        }
    }

    fn stat(&self, handle: &PathBuf) -> io::Result<FileInfo> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_stats.fetch_max(running, Ordering::SeqCst);
        let delay = *self.stat_delay.lock().unwrap();
        std::thread::sleep(delay);
        let result = self.stat_now(handle);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn read_all(&self, handle: &PathBuf) -> io::Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected read failure"));
        }
        if self.is_dir(handle) {
            return Ok(Vec::new());
        }
        let files = self.files.lock().unwrap();
        let file = files.get(handle).ok_or_else(|| Self::not_found(handle))?;
        Ok(file.data.clone())
    }

    fn read_dir(&self, handle: &PathBuf, limit: Option<usize>) -> io::Result<Vec<FileInfo>> {
        let files = self.files.lock().unwrap();
        let mut entries: Vec<FileInfo> = files
            .iter()
            .filter(|(path, _)| path.parent() == Some(handle.as_path()))
            .map(|(path, file)| FileInfo {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size: file.data.len() as u64,
                modified: file.modified,
                is_dir: false,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

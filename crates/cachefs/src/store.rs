//! Underlying file store the cache reads through

use crate::types::FileInfo;
use chrono::{DateTime, Utc};
use std::fs::{self, File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Blocking primitives the cache needs from a filesystem
pub trait FileStore: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    fn open(&self, path: &Path) -> io::Result<Self::Handle>;

    /// Live stat of whatever the handle's path names now
    fn stat(&self, handle: &Self::Handle) -> io::Result<FileInfo>;

    /// Stat of the object the handle has open, i.e. what `read_all` will
    /// read even if the path was replaced since `open`
    fn stat_open(&self, handle: &Self::Handle) -> io::Result<FileInfo> {
        self.stat(handle)
    }

    fn read_all(&self, handle: &Self::Handle) -> io::Result<Vec<u8>>;

    /// List a directory handle. `None` returns every entry.
    fn read_dir(&self, handle: &Self::Handle, limit: Option<usize>) -> io::Result<Vec<FileInfo>>;
}

/// [`FileStore`] backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileStore;

#[derive(Debug)]
pub struct OsHandle {
    path: PathBuf,
    file: File,
}

impl OsHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

fn file_info(name: String, meta: &Metadata) -> io::Result<FileInfo> {
    Ok(FileInfo {
        name,
        size: meta.len(),
        modified: DateTime::<Utc>::from(meta.modified()?),
        is_dir: meta.is_dir(),
    })
}

impl FileStore for OsFileStore {
    type Handle = OsHandle;

    fn open(&self, path: &Path) -> io::Result<OsHandle> {
        let file = File::open(path)?;
        Ok(OsHandle {
            path: path.to_path_buf(),
            file,
        })
    }

    // Stat by path rather than by descriptor: a file replaced via rename
    // keeps the old inode behind the open descriptor.
    fn stat(&self, handle: &OsHandle) -> io::Result<FileInfo> {
        file_info(handle.name(), &fs::metadata(&handle.path)?)
    }

    fn stat_open(&self, handle: &OsHandle) -> io::Result<FileInfo> {
        file_info(handle.name(), &handle.file.metadata()?)
    }

    fn read_all(&self, handle: &OsHandle) -> io::Result<Vec<u8>> {
        let meta = handle.file.metadata()?;
        if meta.is_dir() {
            return Ok(Vec::new());
        }

        let mut data = Vec::with_capacity(meta.len() as usize);
        let mut file = &handle.file;
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn read_dir(&self, handle: &OsHandle, limit: Option<usize>) -> io::Result<Vec<FileInfo>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&handle.path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(file_info(
                entry.file_name().to_string_lossy().into_owned(),
                &meta,
            )?);
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

//! Open read handle over a cached file

use crate::cursor::{Chunk, CircularCursor, Origin};
use crate::entry::{CacheEntry, Revalidated, Snapshot};
use crate::error::Result;
use crate::registry::CacheFs;
use crate::store::{FileStore, OsFileStore};
use crate::types::FileInfo;
use std::fmt;
use std::io;
use std::sync::Arc;

/// One consumer's view of a cached file.
///
/// Every open gets its own handle: the content is shared with the entry and
/// all other handles, the read position is not. Each operation revalidates
/// the entry first. A handle keeps reading the content it was opened on
/// until it either detects a change itself or finishes a pass, at which
/// point it moves to the entry's newest content.
pub struct CachedFile<S: FileStore = OsFileStore> {
    entry: Arc<CacheEntry<S>>,
    cursor: CircularCursor,
    generation: u64,
    registry: Option<CacheFs<S>>,
}

impl<S: FileStore> CachedFile<S> {
    pub(crate) fn new(entry: Arc<CacheEntry<S>>, registry: Option<CacheFs<S>>) -> Self {
        let snapshot = entry.snapshot();
        Self {
            cursor: snapshot.cursor.clone(),
            generation: snapshot.generation,
            entry,
            registry,
        }
    }

    pub fn entry(&self) -> &Arc<CacheEntry<S>> {
        &self.entry
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Size of the content this handle is reading
    pub fn size(&self) -> u64 {
        self.cursor.size()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<Chunk> {
        self.revalidate()?;
        let chunk = self.cursor.read(buf);
        if chunk == Chunk::EndOfData && self.entry.generation() != self.generation {
            let snapshot = self.entry.snapshot();
            self.adopt(&snapshot);
        }
        Ok(chunk)
    }

    pub fn seek(&mut self, offset: i64, origin: Origin) -> Result<u64> {
        self.revalidate()?;
        self.cursor.seek(offset, origin)
    }

    pub fn stat(&mut self) -> Result<FileInfo> {
        Ok(self.revalidate()?.info)
    }

    pub fn list_directory(&mut self, limit: Option<usize>) -> Result<Vec<FileInfo>> {
        let revalidated = self.revalidate()?;
        self.entry.read_dir(&revalidated.snapshot, limit)
    }

    /// The entry's current content as one buffer, with the stat taken when
    /// it was loaded, so the two always describe the same bytes. A handle
    /// still on older content moves to this one at position 0.
    pub fn content(&mut self) -> Result<(FileInfo, Arc<[u8]>)> {
        let revalidated = self.revalidate()?;
        let snapshot = revalidated.snapshot;
        if snapshot.generation != self.generation {
            self.adopt(&snapshot);
        }
        Ok((snapshot.info.clone(), Arc::clone(snapshot.cursor.buffer())))
    }

    /// Always succeeds. The cached content and the store handle are shared
    /// with every other open of the same path, so nothing is released.
    pub fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn revalidate(&mut self) -> Result<Revalidated<S::Handle>> {
        let revalidated = self.entry.revalidate()?;
        if revalidated.reloaded {
            self.adopt(&revalidated.snapshot);
            if let Some(registry) = &self.registry {
                registry.register(self.entry.path(), Arc::clone(&self.entry));
            }
        }
        Ok(revalidated)
    }

    fn adopt(&mut self, snapshot: &Snapshot<S::Handle>) {
        self.cursor = snapshot.cursor.clone();
        self.generation = snapshot.generation;
    }
}

impl<S: FileStore> Clone for CachedFile<S> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            cursor: self.cursor.clone(),
            generation: self.generation,
            registry: self.registry.clone(),
        }
    }
}

impl<S: FileStore> fmt::Debug for CachedFile<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFile")
            .field("path", &self.entry.path())
            .field("position", &self.cursor.position())
            .field("generation", &self.generation)
            .finish()
    }
}

impl<S: FileStore> io::Read for CachedFile<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match CachedFile::read(self, buf)? {
            Chunk::Data(n) => Ok(n),
            Chunk::EndOfData => Ok(0),
        }
    }
}

impl<S: FileStore> io::Seek for CachedFile<S> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.revalidate()?;
        io::Seek::seek(&mut self.cursor, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::memory::MemoryStore;
    use crate::types::CacheConfig;
    use std::io::{Read, Seek, SeekFrom};

    fn setup(data: &[u8]) -> (Arc<MemoryStore>, Arc<CacheEntry<MemoryStore>>) {
        let store = Arc::new(MemoryStore::default());
        store.put("/f", data, 1);
        let entry = CacheEntry::load("/f", Arc::clone(&store), CacheConfig::default()).unwrap();
        (store, Arc::new(entry))
    }

    fn read_pass(file: &mut CachedFile<MemoryStore>) -> Vec<u8> {
        let mut out = Vec::new();
        file.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_handles_have_independent_positions() {
        let (_store, entry) = setup(b"0123456789");
        let mut a = entry.open();
        let b = entry.open();

        let mut buf = [0u8; 4];
        assert_eq!(a.read(&mut buf).unwrap(), Chunk::Data(4));
        assert_eq!(a.position(), 4);
        assert_eq!(b.position(), 0);

        let mut c = a.clone();
        c.read(&mut buf).unwrap();
        assert_eq!(&buf, b"4567");
        assert_eq!(a.position(), 4);
    }

    #[test]
    fn test_read_after_change_returns_new_content() {
        let (store, entry) = setup(b"old content");
        let mut file = entry.open();
        assert_eq!(read_pass(&mut file), b"old content");

        store.put("/f", b"new content!", 2);
        assert_eq!(read_pass(&mut file), b"new content!");
        assert_eq!(store.reads(), 2);
    }

    #[test]
    fn test_reload_mid_pass_restarts_on_new_content() {
        let (store, entry) = setup(b"abcdef");
        let mut file = entry.open();
        let mut buf = [0u8; 3];
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");

        store.put("/f", b"uvwxyz", 2);
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"uvw");
        assert_eq!(file.position(), 3);
    }

    #[test]
    fn test_older_handle_keeps_snapshot_until_pass_ends() {
        let (store, entry) = setup(b"first");
        let mut old = entry.open();
        let mut buf = [0u8; 2];
        old.read(&mut buf).unwrap();

        store.put("/f", b"second", 2);
        let mut fresh = entry.open();
        assert_eq!(read_pass(&mut fresh), b"second");

        // The entry is fresh again, so the old handle finishes its pass
        let mut rest = Vec::new();
        old.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"rst");

        assert_eq!(read_pass(&mut old), b"second");
    }

    #[test]
    fn test_seek_after_change_uses_new_content() {
        let (store, entry) = setup(b"0123456789");
        let mut file = entry.open();
        file.seek(8, Origin::Start).unwrap();

        store.put("/f", b"abcdefghijklmnop", 2);
        assert_eq!(file.seek(3, Origin::End).unwrap(), 13);

        let mut buf = [0u8; 3];
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"nop");
    }

    #[test]
    fn test_negative_seek_fails() {
        let (_store, entry) = setup(b"abc");
        let mut file = entry.open();
        assert!(matches!(
            file.seek(-1, Origin::Current),
            Err(CacheError::OutOfRangeSeek { .. })
        ));
        assert!(file.seek(-1, Origin::End).is_ok());
    }

    #[test]
    fn test_std_seek_and_stat() {
        let (_store, entry) = setup(b"hello world");
        let mut file = entry.open();
        assert_eq!(Seek::seek(&mut file, SeekFrom::End(-5)).unwrap(), 6);

        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        assert_eq!(out, "world");

        let info = file.stat().unwrap();
        assert_eq!(info.size, 11);
        assert!(!info.is_dir);
    }

    #[test]
    fn test_read_error_surfaces_when_file_removed() {
        let (store, entry) = setup(b"abc");
        let mut file = entry.open();
        store.remove(std::path::Path::new("/f"));

        let mut buf = [0u8; 2];
        assert!(file.read(&mut buf).unwrap_err().is_not_found());
        assert!(Read::read(&mut file, &mut buf).is_err());
    }

    #[test]
    fn test_close_does_not_affect_other_handles() {
        let (_store, entry) = setup(b"shared");
        let mut a = entry.open();
        let mut b = entry.open();
        a.close().unwrap();
        a.close().unwrap();

        assert_eq!(read_pass(&mut b), b"shared");
        assert_eq!(read_pass(&mut entry.open()), b"shared");
    }

    #[test]
    fn test_list_directory_through_handle() {
        let store = Arc::new(MemoryStore::default());
        store.mkdir("/d");
        store.put("/d/one", b"1", 1);
        store.put("/d/two", b"22", 1);
        let entry =
            Arc::new(CacheEntry::load("/d", Arc::clone(&store), CacheConfig::default()).unwrap());

        let mut dir = entry.open();
        assert_eq!(dir.size(), 0);
        let listing = dir.list_directory(None).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[1].name, "two");
        assert_eq!(listing[1].size, 2);
    }

    #[test]
    fn test_content_matches_its_stat() {
        let (store, entry) = setup(b"first");
        let mut old = entry.open();
        let mut buf = [0u8; 2];
        old.read(&mut buf).unwrap();

        store.put("/f", b"second!", 2);
        let (info, content) = entry.open().content().unwrap();
        assert_eq!(&*content, b"second!");
        assert_eq!(info.size, 7);

        // The older handle gets the same snapshot, not the one it was reading
        let (info, content) = old.content().unwrap();
        assert_eq!(&*content, b"second!");
        assert_eq!(info.modified, crate::memory::at(2));
        assert_eq!(old.position(), 0);
        assert_eq!(store.reads(), 2);
    }
}

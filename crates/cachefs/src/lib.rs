//! Modification-time validated file content cache
//!
//! Files are read once into an immutable in-memory buffer and handed out as
//! independent, seekable read handles. Every operation on a handle first
//! compares the file's live modification time with the one captured at load
//! time and reloads the whole file when they differ.

mod cursor;
mod entry;
mod error;
mod handle;
#[cfg(test)]
mod memory;
mod registry;
mod store;
mod types;

pub use cursor::{Chunk, CircularCursor, Origin};
pub use entry::{CacheEntry, Freshness};
pub use error::{CacheError, Result};
pub use handle::CachedFile;
pub use registry::CacheFs;
pub use store::{FileStore, OsFileStore, OsHandle};
pub use types::{CacheConfig, CacheStats, FileInfo};

//! Error types for the file content cache

use crate::cursor::Origin;
use std::fmt;
use std::io;
use std::sync::Arc;

#[derive(Debug)]
pub enum CacheError {
    Io(Box<io::Error>),
    OutOfRangeSeek { offset: i64, origin: Origin },
    InvalidPath(String),
}

impl CacheError {
    /// True when the underlying store reported the file as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Io(err) if err.kind() == io::ErrorKind::NotFound)
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::OutOfRangeSeek { offset, origin } => {
                write!(f, "Seek out of range: offset {} from {:?}", offset, origin)
            }
            CacheError::InvalidPath(path) => write!(f, "Invalid path: {}", path),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<CacheError> for io::Error {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Io(err) => *err,
            other => io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
        }
    }
}

// A failed load is shared by every caller that waited on it
impl From<Arc<CacheError>> for CacheError {
    fn from(err: Arc<CacheError>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(|shared| match &*shared {
            CacheError::Io(err) => {
                CacheError::Io(Box::new(io::Error::new(err.kind(), err.to_string())))
            }
            CacheError::OutOfRangeSeek { offset, origin } => CacheError::OutOfRangeSeek {
                offset: *offset,
                origin: *origin,
            },
            CacheError::InvalidPath(path) => CacheError::InvalidPath(path.clone()),
        })
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

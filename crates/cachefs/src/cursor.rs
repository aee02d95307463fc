//! Circular read cursor over an immutable byte buffer
//!
//! A cursor never stays exhausted: once it has reported end of data, the next
//! read starts again from the first byte. Each clone shares the buffer and
//! owns its position, so clones never need locking.

use crate::error::{CacheError, Result};
use std::io;
use std::sync::Arc;

/// Reference point for [`CircularCursor::seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Start,
    Current,
    /// Counts backwards: `offset` bytes before the end of the buffer
    End,
}

/// Outcome of a single [`CircularCursor::read`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    Data(usize),
    /// The pass is over; the cursor has been rewound to the start
    EndOfData,
}

#[derive(Debug, Clone)]
pub struct CircularCursor {
    buf: Arc<[u8]>,
    pos: u64,
}

impl CircularCursor {
    pub fn new(buf: impl Into<Arc<[u8]>>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    /// Length of the underlying buffer
    pub fn size(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// The whole shared buffer, independent of the position
    pub fn buffer(&self) -> &Arc<[u8]> {
        &self.buf
    }

    /// True when nothing is left to read in the current pass
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.size()
    }

    /// Copy bytes from the current position into `out`.
    ///
    /// An exhausted cursor answers a zero-length request with `Data(0)` and
    /// leaves its position alone; any other request rewinds it to the start
    /// and reports `EndOfData`.
    pub fn read(&mut self, out: &mut [u8]) -> Chunk {
        if self.is_exhausted() {
            if out.is_empty() {
                return Chunk::Data(0);
            }
            self.pos = 0;
            return Chunk::EndOfData;
        }

        // pos < buf.len() here, so it fits in usize
        let start = self.pos as usize;
        let n = out.len().min(self.buf.len() - start);
        out[..n].copy_from_slice(&self.buf[start..start + n]);
        self.pos += n as u64;
        Chunk::Data(n)
    }

    /// Move the position. Positions past the end are allowed and read as
    /// exhausted; positions before the start are rejected.
    pub fn seek(&mut self, offset: i64, origin: Origin) -> Result<u64> {
        let target = match origin {
            Origin::Start => offset as i128,
            Origin::Current => self.pos as i128 + offset as i128,
            Origin::End => self.size() as i128 - offset as i128,
        };

        if target < 0 || target > u64::MAX as i128 {
            return Err(CacheError::OutOfRangeSeek { offset, origin });
        }

        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl io::Read for CircularCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match CircularCursor::read(self, buf) {
            Chunk::Data(n) => Ok(n),
            Chunk::EndOfData => Ok(0),
        }
    }
}

impl io::Seek for CircularCursor {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let result = match pos {
            io::SeekFrom::Start(n) => {
                self.pos = n;
                Ok(n)
            }
            io::SeekFrom::Current(n) => CircularCursor::seek(self, n, Origin::Current),
            io::SeekFrom::End(n) => match n.checked_neg() {
                Some(back) => CircularCursor::seek(self, back, Origin::End),
                None => Err(CacheError::OutOfRangeSeek {
                    offset: n,
                    origin: Origin::End,
                }),
            },
        };
        result.map_err(io::Error::from)
    }
}

//! # Chunk Reader
//!
//! Seekable byte stream over a record's chunk rows.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  CHUNK READER (size 5, length 12)                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  rows:   [0: "01234"] [1: "56789"] [2: "ab"]                           │
//! │                                                                         │
//! │  seek(7, Start)      offset 7, buffer dropped, nothing fetched         │
//! │  read(..)            fetch row 7/5 = 1, keep "789" (from 7%5 = 2)      │
//! │                      offset 10 (end of the fetched row)                │
//! │  read(..)            buffer drained → fetch row 2, offset 12           │
//! │  read(..)            buffer empty, offset == length → end of stream    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `offset` always points just past the last fetched row; the logical
//! cursor is `offset` minus whatever is still buffered. Rows are never
//! cached across seeks.

use std::io;

use super::chunks::ChunkSource;
use crate::error::{Error, Result};
use crate::types::RecordId;

/// Origin for [`ChunkReader::seek_to`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute position
    Start,
    /// Relative to the current cursor
    Current,
    /// Distance measured backward from the end
    End,
}

impl TryFrom<i32> for Whence {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(Error::InvalidWhence(other)),
        }
    }
}

/// Lazily fetches chunk rows as the caller reads
pub struct ChunkReader<S: ChunkSource> {
    source: S,
    id: RecordId,
    chunk_size: u64,
    file_length: u64,
    /// End of the most recently fetched row, or the seek target
    offset: u64,
    /// Most recently fetched row
    buf: Vec<u8>,
    /// Read cursor into `buf`
    pos: usize,
}

impl<S: ChunkSource> ChunkReader<S> {
    /// Open a reader over the chunk rows of `id`.
    ///
    /// Fails with `NotFound` when the record has no chunk rows at all.
    pub fn open(source: S, id: RecordId) -> Result<Self> {
        let extent = source
            .chunk_extent(&id)?
            .ok_or_else(|| Error::NotFound(id.clone()))?;

        Ok(Self {
            source,
            id,
            chunk_size: extent.chunk_size,
            file_length: extent.file_length(),
            offset: 0,
            buf: Vec::new(),
            pos: 0,
        })
    }

    /// A reader for a record whose content is empty
    pub fn empty(source: S, id: RecordId) -> Self {
        Self {
            source,
            id,
            chunk_size: 0,
            file_length: 0,
            offset: 0,
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Record this reader belongs to
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Content length in bytes
    pub fn len(&self) -> u64 {
        self.file_length
    }

    /// Whether the content is empty
    pub fn is_empty(&self) -> bool {
        self.file_length == 0
    }

    /// Chunk size inferred from the first row (0 for empty content)
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Logical cursor: the position of the next byte `read` returns
    pub fn position(&self) -> u64 {
        self.offset - self.buffered() as u64
    }

    fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fill `out` from the buffer, fetching rows as it runs dry.
    ///
    /// Returns `Ok(0)` only once the cursor sits at the end of the
    /// content: a read that lands exactly on the end reports its bytes and
    /// the following call reports end of stream.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut read = 0;

        loop {
            let n = self.buffered().min(out.len() - read);
            out[read..read + n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            read += n;

            if read == out.len() {
                return Ok(read);
            }

            // Buffer drained
            if self.offset >= self.file_length {
                return Ok(read);
            }

            match self.populate() {
                Ok(()) => {}
                // Hand back what we have; the failure repeats on the next call
                Err(e) if read > 0 => {
                    tracing::warn!(id = self.id.as_str(), error = %e, "Chunk fetch failed mid-read");
                    return Ok(read);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch the row containing `offset` and buffer its tail.
    ///
    /// Advances `offset` to the end of that row, so the whole row counts as
    /// consumed at fetch time and the next fetch happens only after the
    /// buffer is drained.
    fn populate(&mut self) -> Result<()> {
        let index = self.offset / self.chunk_size;
        let chunk = self
            .source
            .fetch_chunk(&self.id, index)?
            .ok_or_else(|| Error::ChunkMissing {
                id: self.id.clone(),
                index,
            })?;

        let read_start = (self.offset % self.chunk_size) as usize;
        if read_start >= chunk.len() {
            return Err(Error::Corrupted(format!(
                "chunk {} of {} is {} bytes, expected more than {}",
                index,
                self.id,
                chunk.len(),
                read_start
            )));
        }

        self.offset += (chunk.len() - read_start) as u64;
        self.buf = chunk;
        self.pos = read_start;
        Ok(())
    }

    /// Move the cursor.
    ///
    /// The buffer is dropped unconditionally and nothing is fetched until
    /// the next read. With [`Whence::End`] the argument is a distance back
    /// from the end: `seek_to(1, Whence::End)` lands on the last byte.
    pub fn seek_to(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.invalidate();
        let cursor = self.offset;

        let target = match whence {
            Whence::Start => i128::from(offset),
            Whence::Current => i128::from(cursor) + i128::from(offset),
            Whence::End => i128::from(self.file_length) - i128::from(offset),
        };

        let target = u64::try_from(target).map_err(|_| {
            Error::InvalidSeek(format!(
                "{:?} {} resolves to {} in record {}",
                whence, offset, target, self.id
            ))
        })?;

        self.offset = target;
        Ok(target)
    }

    /// Like [`ChunkReader::seek_to`] with a numeric origin (0, 1 or 2)
    pub fn seek_raw(&mut self, offset: i64, whence: i32) -> Result<u64> {
        self.invalidate();
        let whence = Whence::try_from(whence)?;
        self.seek_to(offset, whence)
    }

    /// Drop the buffer, pulling `offset` back to the logical cursor
    fn invalidate(&mut self) {
        self.offset = self.position();
        self.buf.clear();
        self.pos = 0;
    }
}

impl<S: ChunkSource> io::Read for ChunkReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ChunkReader::read(self, buf).map_err(io::Error::from)
    }
}

/// Standard seek semantics: `SeekFrom::End(-1)` is the last byte.
impl<S: ChunkSource> io::Seek for ChunkReader<S> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let result = match pos {
            io::SeekFrom::Start(n) => {
                self.invalidate();
                self.offset = n;
                Ok(n)
            }
            io::SeekFrom::Current(d) => self.seek_to(d, Whence::Current),
            io::SeekFrom::End(d) => match d.checked_neg() {
                Some(back) => self.seek_to(back, Whence::End),
                None => Err(Error::InvalidSeek(format!("end offset {} out of range", d))),
            },
        };
        result.map_err(io::Error::from)
    }
}

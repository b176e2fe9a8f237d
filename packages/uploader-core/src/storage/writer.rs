//! # Chunk Writer
//!
//! Turns a byte stream into fixed-size chunk rows.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CHUNK WRITER (size 5)                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  write("123")     buf [1 2 3 . .]   written 3                          │
//! │  write("4567")    buf [1 2 3 4 5]   full → row (0, "12345")            │
//! │                   buf [6 7 . . .]   written 7                          │
//! │  close()          remainder → row (1, "67")                            │
//! │                                                                         │
//! │  Index of a flushed row = written / size, taken before the copy that   │
//! │  filled the buffer is counted.                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::io;

use super::chunks::ChunkSink;
use crate::error::{Error, Result};
use crate::types::RecordId;

/// Buffers incoming bytes and emits one chunk row per full buffer.
///
/// Only [`ChunkWriter::close`] may emit a short chunk, so dropping a writer
/// without closing it loses the unflushed tail.
pub struct ChunkWriter<S: ChunkSink> {
    sink: S,
    id: RecordId,
    buf: Vec<u8>,
    written: u64,
}

impl<S: ChunkSink> ChunkWriter<S> {
    /// Create a writer for record `id`
    pub fn new(sink: S, id: RecordId, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidChunkSize(chunk_size));
        }

        Ok(Self {
            sink,
            id,
            buf: vec![0; chunk_size],
            written: 0,
        })
    }

    /// Configured chunk size
    pub fn chunk_size(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes accepted so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append `data`, flushing a row every time the buffer fills up.
    ///
    /// Either every byte is accepted or an error is returned; a failed
    /// insert is not resumable.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let size = self.buf.len();
        let mut consumed = 0;

        while consumed < data.len() {
            let start = (self.written % size as u64) as usize;
            let count = (size - start).min(data.len() - consumed);

            self.buf[start..start + count].copy_from_slice(&data[consumed..consumed + count]);

            if start + count == size {
                let index = self.written / size as u64;
                self.sink.insert_chunk(&self.id, index, &self.buf)?;
            }

            self.written += count as u64;
            consumed += count;
        }

        Ok(consumed)
    }

    /// Flush the partial tail, if any, and return the total length
    pub fn close(self) -> Result<u64> {
        let size = self.buf.len() as u64;
        let tail = (self.written % size) as usize;

        if tail != 0 {
            self.sink
                .insert_chunk(&self.id, self.written / size, &self.buf[..tail])?;
        }

        tracing::debug!(
            id = self.id.as_str(),
            bytes = self.written,
            chunks = self.written.div_ceil(size),
            "Chunk writer closed"
        );

        Ok(self.written)
    }
}

impl<S: ChunkSink> io::Write for ChunkWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ChunkWriter::write(self, buf).map_err(io::Error::from)
    }

    // Short chunks may only come from `close`
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

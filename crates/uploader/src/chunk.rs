//! Fixed-size chunk reading with seek-to-offset resume.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Reads a file in fixed-size chunks for resumable upload.
///
/// Blocking; drive it from `spawn_blocking` in async contexts.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    pub fn new(path: &Path, chunk_size: usize) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
        })
    }

    /// Seeks to `offset` so the next chunk resumes there.
    pub fn seek_to(&mut self, offset: u64) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next chunk as `(offset, bytes)`. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> std::io::Result<Option<(u64, Vec<u8>)>> {
        if self.offset >= self.file_size {
            return Ok(None);
        }

        let remaining = (self.file_size - self.offset) as usize;
        let read_size = remaining.min(self.chunk_size);
        let mut buf = vec![0u8; read_size];
        let mut filled = 0;
        while filled < read_size {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        if buf.is_empty() {
            return Ok(None);
        }

        let chunk_offset = self.offset;
        self.offset += buf.len() as u64;
        Ok(Some((chunk_offset, buf)))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }
}

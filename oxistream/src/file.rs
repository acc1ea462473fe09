//! File-cached stream adapters.
//!
//! These backends stage bytes in an anonymous temporary file
//! ([`tempfile::tempfile`]), trading memory footprint for disk I/O. The
//! operating system unlinks the file as soon as it is created, so the
//! backing storage disappears when the handle is dropped, no matter how
//! the stream ends.
//!
//! The input variant pulls from its source sequentially into the file and
//! keeps every byte randomly re-readable even after the source is
//! exhausted. The output variant writes into the file at arbitrary
//! positions (gaps read back as zeros) and copies flushed ranges out to
//! the sink; the file is retained until close, so flushed-but-unread data
//! costs disk, not correctness.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::backend::{CacheBackend, WritableBackend};
use crate::error::{Result, StreamError};
use crate::stream::BitStream;

/// Chunk size for source pulls and sink pushes.
const TRANSFER_BLOCK: usize = 8192;

/// File-cache backend over a forward-only source.
#[derive(Debug)]
pub struct FileCacheInput<R: Read> {
    source: R,
    file: Option<File>,
    /// Bytes cached in the backing file so far.
    length: u64,
    /// Set once the source has reported end of data.
    found_eof: bool,
}

impl<R: Read> FileCacheInput<R> {
    /// Wrap a forward-only source, creating the backing file.
    pub fn new(source: R) -> Result<Self> {
        Ok(Self {
            source,
            file: Some(tempfile::tempfile()?),
            length: 0,
            found_eof: false,
        })
    }

    /// Pull from the source into the backing file until `pos` bytes are
    /// cached or the source is exhausted. Returns `min(pos, length)`.
    fn read_until(&mut self, pos: u64) -> Result<u64> {
        if pos < self.length {
            return Ok(pos);
        }
        if self.found_eof {
            return Ok(self.length);
        }
        let mut buf = [0u8; TRANSFER_BLOCK];
        while self.length < pos {
            let want = ((pos - self.length) as usize).min(TRANSFER_BLOCK);
            let n = self.source.read(&mut buf[..want])?;
            if n == 0 {
                self.found_eof = true;
                break;
            }
            let file = self.file.as_mut().ok_or(StreamError::ClosedStream)?;
            file.seek(SeekFrom::Start(self.length))?;
            file.write_all(&buf[..n])?;
            self.length += n as u64;
        }
        Ok(pos.min(self.length))
    }
}

impl<R: Read> CacheBackend for FileCacheInput<R> {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let reached = self.read_until(pos + buf.len() as u64)?;
        if pos >= reached {
            return Ok(0);
        }
        let n = ((reached - pos) as usize).min(buf.len());
        let file = self.file.as_mut().ok_or(StreamError::ClosedStream)?;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut buf[..n])?;
        Ok(n)
    }

    fn flush_before(&mut self, _from: u64, _to: u64) -> Result<()> {
        // The backing file is kept whole until close; flushing only moves
        // the engine's seek boundary.
        Ok(())
    }

    fn stream_length(&self) -> Option<u64> {
        None
    }

    fn close(&mut self, _flushed: u64) -> Result<()> {
        self.file = None;
        Ok(())
    }

    fn is_cached_file(&self) -> bool {
        true
    }

    fn is_cached_memory(&self) -> bool {
        false
    }
}

/// File-cache backend over a forward-only sink.
#[derive(Debug)]
pub struct FileCacheOutput<W: Write> {
    sink: W,
    file: Option<File>,
    /// Highest position ever made valid by a write.
    length: u64,
}

impl<W: Write> FileCacheOutput<W> {
    /// Wrap a forward-only sink, creating the backing file.
    pub fn new(sink: W) -> Result<Self> {
        Ok(Self {
            sink,
            file: Some(tempfile::tempfile()?),
            length: 0,
        })
    }
}

impl<W: Write> CacheBackend for FileCacheOutput<W> {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        if pos >= self.length {
            return Ok(0);
        }
        let n = ((self.length - pos) as usize).min(buf.len());
        let file = self.file.as_mut().ok_or(StreamError::ClosedStream)?;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut buf[..n])?;
        Ok(n)
    }

    fn flush_before(&mut self, from: u64, to: u64) -> Result<()> {
        if from < to {
            if to > self.length {
                return Err(StreamError::out_of_bounds(to - 1, 0, self.length));
            }
            let file = self.file.as_mut().ok_or(StreamError::ClosedStream)?;
            file.seek(SeekFrom::Start(from))?;
            let mut buf = [0u8; TRANSFER_BLOCK];
            let mut pos = from;
            while pos < to {
                let n = ((to - pos) as usize).min(TRANSFER_BLOCK);
                file.read_exact(&mut buf[..n])?;
                self.sink.write_all(&buf[..n])?;
                pos += n as u64;
            }
            self.sink.flush()?;
        }
        Ok(())
    }

    fn stream_length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn close(&mut self, flushed: u64) -> Result<()> {
        let result = if self.length > flushed {
            self.flush_before(flushed, self.length)
        } else {
            self.sink.flush().map_err(StreamError::from)
        };
        // Drop the backing file even when the final push failed.
        self.file = None;
        result
    }

    fn is_cached_file(&self) -> bool {
        true
    }

    fn is_cached_memory(&self) -> bool {
        false
    }
}

impl<W: Write> WritableBackend for FileCacheOutput<W> {
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or(StreamError::ClosedStream)?;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(buf)?;
        self.length = self.length.max(pos + buf.len() as u64);
        Ok(())
    }
}

/// A readable stream that caches a forward-only source in a temp file.
pub type FileCacheInputStream<R> = BitStream<FileCacheInput<R>>;

/// A writable stream that stages data for a forward-only sink in a temp
/// file.
pub type FileCacheOutputStream<W> = BitStream<FileCacheOutput<W>>;

impl<R: Read> BitStream<FileCacheInput<R>> {
    /// Open a file-cached stream over a forward-only source.
    ///
    /// Fails when the temporary file cannot be created.
    pub fn new(source: R) -> Result<Self> {
        Ok(Self::with_backend(FileCacheInput::new(source)?))
    }
}

impl<W: Write> BitStream<FileCacheOutput<W>> {
    /// Open a file-cached stream over a forward-only sink.
    ///
    /// Fails when the temporary file cannot be created.
    pub fn new(sink: W) -> Result<Self> {
        Ok(Self::with_backend(FileCacheOutput::new(sink)?))
    }
}

//! Memory-cached stream adapters.
//!
//! These backends stage data in a [`MemoryCache`] so a forward-only
//! source or sink gains full random seek without touching the
//! filesystem. The input variant pulls from its source lazily, only as
//! far as a read requires; the output variant buffers writes and pushes
//! them to the sink when the stream is flushed or closed, evicting the
//! pushed prefix as it goes.

use std::io::{Read, Write};

use crate::backend::{CacheBackend, WritableBackend};
use crate::error::Result;
use crate::memcache::MemoryCache;
use crate::stream::BitStream;

/// Memory-cache backend over a forward-only source.
#[derive(Debug)]
pub struct MemoryCacheInput<R: Read> {
    source: R,
    cache: MemoryCache,
}

impl<R: Read> MemoryCacheInput<R> {
    /// Wrap a forward-only source.
    pub fn new(source: R) -> Self {
        Self {
            source,
            cache: MemoryCache::new(),
        }
    }
}

impl<R: Read> CacheBackend for MemoryCacheInput<R> {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let reached = self
            .cache
            .load_from_source(&mut self.source, pos + buf.len() as u64)?;
        if pos >= reached {
            return Ok(0);
        }
        let n = ((reached - pos) as usize).min(buf.len());
        self.cache.read(&mut buf[..n], pos)?;
        Ok(n)
    }

    fn flush_before(&mut self, _from: u64, to: u64) -> Result<()> {
        self.cache.dispose_before(to)
    }

    fn stream_length(&self) -> Option<u64> {
        None
    }

    fn close(&mut self, _flushed: u64) -> Result<()> {
        self.cache.reset();
        Ok(())
    }

    fn is_cached_file(&self) -> bool {
        false
    }

    fn is_cached_memory(&self) -> bool {
        true
    }
}

/// Memory-cache backend over a forward-only sink.
#[derive(Debug)]
pub struct MemoryCacheOutput<W: Write> {
    sink: W,
    cache: MemoryCache,
}

impl<W: Write> MemoryCacheOutput<W> {
    /// Wrap a forward-only sink.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            cache: MemoryCache::new(),
        }
    }
}

impl<W: Write> CacheBackend for MemoryCacheOutput<W> {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let length = self.cache.length();
        if pos >= length {
            return Ok(0);
        }
        let n = ((length - pos) as usize).min(buf.len());
        self.cache.read(&mut buf[..n], pos)?;
        Ok(n)
    }

    fn flush_before(&mut self, from: u64, to: u64) -> Result<()> {
        self.cache.write_to_sink(&mut self.sink, from, to - from)?;
        self.sink.flush()?;
        self.cache.dispose_before(to)
    }

    fn stream_length(&self) -> Option<u64> {
        Some(self.cache.length())
    }

    fn close(&mut self, flushed: u64) -> Result<()> {
        let length = self.cache.length();
        if length > flushed {
            self.flush_before(flushed, length)?;
        } else {
            self.sink.flush()?;
        }
        self.cache.reset();
        Ok(())
    }

    fn is_cached_file(&self) -> bool {
        false
    }

    fn is_cached_memory(&self) -> bool {
        true
    }
}

impl<W: Write> WritableBackend for MemoryCacheOutput<W> {
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        self.cache.write(buf, pos)
    }
}

/// A readable stream that caches a forward-only source in memory.
pub type MemoryCacheInputStream<R> = BitStream<MemoryCacheInput<R>>;

/// A writable stream that stages data for a forward-only sink in memory.
pub type MemoryCacheOutputStream<W> = BitStream<MemoryCacheOutput<W>>;

impl<R: Read> BitStream<MemoryCacheInput<R>> {
    /// Open a memory-cached stream over a forward-only source.
    pub fn new(source: R) -> Self {
        Self::with_backend(MemoryCacheInput::new(source))
    }
}

impl<W: Write> BitStream<MemoryCacheOutput<W>> {
    /// Open a memory-cached stream over a forward-only sink.
    pub fn new(sink: W) -> Self {
        Self::with_backend(MemoryCacheOutput::new(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_lazy_load_and_reread() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut stream = MemoryCacheInputStream::new(Cursor::new(data.clone()));

        let mut all = vec![0u8; 1000];
        stream.read_fully(&mut all).unwrap();
        assert_eq!(all, data);

        stream.seek(0).unwrap();
        let mut again = vec![0u8; 1000];
        stream.read_fully(&mut again).unwrap();
        assert_eq!(again, data);
    }

    #[test]
    fn test_capability_flags() {
        let stream = MemoryCacheInputStream::new(Cursor::new(vec![0u8]));
        assert!(stream.is_cached());
        assert!(stream.is_cached_memory());
        assert!(!stream.is_cached_file());
        assert_eq!(stream.length(), None);
    }

    #[test]
    fn test_output_flush_pushes_prefix() {
        let mut sink = Vec::new();
        let mut out = MemoryCacheOutputStream::new(&mut sink);
        out.write_bytes(b"abcdefgh").unwrap();
        out.seek(4).unwrap();
        out.flush().unwrap();
        out.write_bytes(b"WXYZ").unwrap();
        out.close().unwrap();
        drop(out);
        assert_eq!(sink, b"abcdWXYZ");
    }

    #[test]
    fn test_output_length_is_high_water() {
        let mut sink = Vec::new();
        let mut out = MemoryCacheOutputStream::new(&mut sink);
        out.write_bytes(b"0123456789").unwrap();
        out.seek(2).unwrap();
        out.write_bytes(b"ab").unwrap();
        assert_eq!(out.length(), Some(10));
    }

    #[test]
    fn test_drop_flushes_to_sink() {
        let mut sink = Vec::new();
        {
            let mut out = MemoryCacheOutputStream::new(&mut sink);
            out.write_bytes(b"pending").unwrap();
            // No close: drop performs the teardown.
        }
        assert_eq!(sink, b"pending");
    }

    #[test]
    fn test_read_back_own_writes() {
        let mut out = MemoryCacheOutputStream::new(Vec::new());
        out.write_bytes(b"hello").unwrap();
        out.seek(1).unwrap();
        let mut buf = [0u8; 3];
        out.read_fully(&mut buf).unwrap();
        assert_eq!(&buf, b"ell");
        assert_eq!(out.read_byte().unwrap(), Some(b'o'));
        assert_eq!(out.read_byte().unwrap(), None);
    }
}

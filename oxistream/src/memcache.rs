//! Growable in-memory block cache with FIFO-prefix eviction.
//!
//! [`MemoryCache`] stores a byte stream as a list of fixed-size blocks
//! addressed by absolute stream position. Blocks are allocated lazily as
//! data is loaded or written, and can only be released from the front
//! (positions below a boundary), never from the middle. The cache length
//! is a high-water mark: it never shrinks, even after eviction, so
//! addressing of retained positions is unaffected by disposal.
//!
//! Block `p / BLOCK_SIZE` of the stream lives at list index
//! `p / BLOCK_SIZE - cache_start`; every block below `cache_start` has
//! been disposed and every block from `cache_start` up to the end of the
//! list is present and contiguous.

use std::io::{Read, Write};

use crate::error::{Result, StreamError};

/// Size of one cache block in bytes.
pub const BLOCK_SIZE: usize = 8192;

/// A FIFO-evicting block cache over an absolute byte address space.
#[derive(Debug, Default)]
pub struct MemoryCache {
    /// Resident blocks, each exactly `BLOCK_SIZE` bytes.
    blocks: Vec<Box<[u8]>>,
    /// Block index of the first resident block.
    cache_start: u64,
    /// Highest position ever made valid by a load or write. Monotonic.
    length: u64,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest position ever made valid, independent of later disposal.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// First position still resident. Reads below this boundary fail.
    fn floor(&self) -> u64 {
        self.cache_start * BLOCK_SIZE as u64
    }

    fn alloc_block(&mut self) -> Result<()> {
        self.blocks
            .try_reserve(1)
            .map_err(|_| StreamError::out_of_cache_memory(std::mem::size_of::<Box<[u8]>>()))?;
        let mut block = Vec::new();
        block
            .try_reserve_exact(BLOCK_SIZE)
            .map_err(|_| StreamError::out_of_cache_memory(BLOCK_SIZE))?;
        block.resize(BLOCK_SIZE, 0);
        self.blocks.push(block.into_boxed_slice());
        Ok(())
    }

    /// Make sure blocks up to and including `block_index` are allocated.
    /// The caller has already checked that `block_index >= cache_start`.
    fn ensure_block(&mut self, block_index: u64) -> Result<()> {
        while (self.blocks.len() as u64) <= block_index - self.cache_start {
            self.alloc_block()?;
        }
        Ok(())
    }

    fn block(&self, block_index: u64) -> &[u8] {
        &self.blocks[(block_index - self.cache_start) as usize]
    }

    fn block_mut(&mut self, block_index: u64) -> &mut [u8] {
        &mut self.blocks[(block_index - self.cache_start) as usize]
    }

    /// Pull bytes from `source` until `length >= target` or the source is
    /// exhausted, allocating blocks as needed.
    ///
    /// Returns `min(target, length)` after the call, i.e. the position up
    /// to which data is now available.
    pub fn load_from_source<R: Read>(&mut self, source: &mut R, target: u64) -> Result<u64> {
        while self.length < target {
            let block_index = self.length / BLOCK_SIZE as u64;
            let offset = (self.length % BLOCK_SIZE as u64) as usize;
            let want = ((target - self.length) as usize).min(BLOCK_SIZE - offset);
            self.ensure_block(block_index)?;
            let block = self.block_mut(block_index);
            let n = source.read(&mut block[offset..offset + want])?;
            if n == 0 {
                break;
            }
            self.length += n as u64;
        }
        Ok(target.min(self.length))
    }

    /// Overwrite or append `buf` at absolute position `pos`.
    ///
    /// A gap between the current length and `pos` is padded with zero
    /// blocks. Fails with `OutOfBounds` when any target byte lies in a
    /// disposed block.
    pub fn write(&mut self, buf: &[u8], pos: u64) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if pos < self.floor() {
            return Err(StreamError::out_of_bounds(pos, self.floor(), self.length));
        }
        let end = pos + buf.len() as u64;
        self.ensure_block((end - 1) / BLOCK_SIZE as u64)?;

        let mut copied = 0;
        while copied < buf.len() {
            let at = pos + copied as u64;
            let block_index = at / BLOCK_SIZE as u64;
            let offset = (at % BLOCK_SIZE as u64) as usize;
            let n = (buf.len() - copied).min(BLOCK_SIZE - offset);
            self.block_mut(block_index)[offset..offset + n]
                .copy_from_slice(&buf[copied..copied + n]);
            copied += n;
        }
        self.length = self.length.max(end);
        Ok(())
    }

    /// Copy the cached bytes `[pos, pos + len)` to `sink`.
    ///
    /// Fails with `OutOfBounds` unless the whole range is resident.
    pub fn write_to_sink<W: Write>(&mut self, sink: &mut W, pos: u64, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        self.check_resident(pos, len)?;

        let mut copied = 0u64;
        while copied < len {
            let at = pos + copied;
            let block_index = at / BLOCK_SIZE as u64;
            let offset = (at % BLOCK_SIZE as u64) as usize;
            let n = ((len - copied) as usize).min(BLOCK_SIZE - offset);
            sink.write_all(&self.block(block_index)[offset..offset + n])?;
            copied += n as u64;
        }
        Ok(())
    }

    /// Read the byte at `pos`, or `None` at or past the data length.
    ///
    /// Fails with `OutOfBounds` when `pos` has been disposed.
    pub fn read_byte(&self, pos: u64) -> Result<Option<u8>> {
        if pos >= self.length {
            return Ok(None);
        }
        if pos < self.floor() {
            return Err(StreamError::out_of_bounds(pos, self.floor(), self.length));
        }
        let block_index = pos / BLOCK_SIZE as u64;
        Ok(Some(self.block(block_index)[(pos % BLOCK_SIZE as u64) as usize]))
    }

    /// Fill `buf` from the cached bytes starting at `pos`.
    ///
    /// Fails with `OutOfBounds` if any byte of the range is disposed or
    /// was never written.
    pub fn read(&self, buf: &mut [u8], pos: u64) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        self.check_resident(pos, buf.len() as u64)?;

        let mut copied = 0;
        while copied < buf.len() {
            let at = pos + copied as u64;
            let block_index = at / BLOCK_SIZE as u64;
            let offset = (at % BLOCK_SIZE as u64) as usize;
            let n = (buf.len() - copied).min(BLOCK_SIZE - offset);
            buf[copied..copied + n].copy_from_slice(&self.block(block_index)[offset..offset + n]);
            copied += n;
        }
        Ok(())
    }

    fn check_resident(&self, pos: u64, len: u64) -> Result<()> {
        if pos < self.floor() {
            return Err(StreamError::out_of_bounds(pos, self.floor(), self.length));
        }
        if pos + len > self.length {
            return Err(StreamError::out_of_bounds(
                pos + len - 1,
                self.floor(),
                self.length,
            ));
        }
        Ok(())
    }

    /// Release whole blocks strictly below `pos / BLOCK_SIZE`.
    ///
    /// Fails with `OutOfBounds` when `pos` falls in a block that was
    /// already disposed. Positions at or above `pos`'s block keep their
    /// addressing unchanged.
    pub fn dispose_before(&mut self, pos: u64) -> Result<()> {
        let block_index = pos / BLOCK_SIZE as u64;
        if block_index < self.cache_start {
            return Err(StreamError::out_of_bounds(pos, self.floor(), self.length));
        }
        let remove = ((block_index - self.cache_start) as usize).min(self.blocks.len());
        self.blocks.drain(..remove);
        self.cache_start = block_index;
        Ok(())
    }

    /// Drop all blocks and return to the freshly constructed state. The
    /// cache may be reused afterwards.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.cache_start = 0;
        self.length = 0;
    }
}

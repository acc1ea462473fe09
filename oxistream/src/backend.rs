//! The seam between the stream engine and its cache backends.
//!
//! The engine in [`crate::stream`] is pure position and bit arithmetic; all
//! storage goes through these traits. Two backend families implement them:
//! the in-memory block cache ([`crate::memory`]) and the tempfile-backed
//! cache ([`crate::file`]). Read-only backends implement [`CacheBackend`]
//! alone; writable backends additionally implement [`WritableBackend`],
//! which is what gates the engine's write operations at compile time.

use crate::error::Result;

/// Random-access storage behind a [`crate::BitStream`].
///
/// Positions are absolute stream offsets. A backend lazily pulls from its
/// wrapped forward-only source (input variants) or stages writes for its
/// sink (output variants); the engine never talks to the source or sink
/// directly.
pub trait CacheBackend {
    /// Read up to `buf.len()` bytes at the absolute position `pos`.
    ///
    /// Returns the number of bytes read; `0` means `pos` is at or past the
    /// end of the available data (after pulling from the source as far as
    /// needed). A short count can only occur at end of data.
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize>;

    /// Release and/or push the byte range `[from, to)`.
    ///
    /// Output backends copy the range to their sink and flush it before
    /// evicting; input backends may discard cached storage below `to` or
    /// keep it (the file-backed input cache retains its backing file).
    /// The engine guarantees `from <= to` and that `to` never exceeds the
    /// current stream position.
    fn flush_before(&mut self, from: u64, to: u64) -> Result<()>;

    /// Total data length when known.
    ///
    /// Output backends report their high-water mark; input backends return
    /// `None` because the wrapped source's length is unknowable without
    /// draining it.
    fn stream_length(&self) -> Option<u64>;

    /// Tear the backend down, pushing `[flushed, length)` to the sink
    /// first for output variants.
    ///
    /// Called exactly once, by [`crate::BitStream::close`] or by drop.
    /// Storage release itself is best-effort and must not fail; only sink
    /// errors surface.
    fn close(&mut self, flushed: u64) -> Result<()>;

    /// Whether the stream caches data at all. Always true for the two
    /// backend families in this crate.
    fn is_cached(&self) -> bool {
        true
    }

    /// Whether cached data lives in a backing file.
    fn is_cached_file(&self) -> bool;

    /// Whether cached data lives in main memory.
    fn is_cached_memory(&self) -> bool;
}

/// A [`CacheBackend`] that also accepts writes.
pub trait WritableBackend: CacheBackend {
    /// Write `buf` at the absolute position `pos`, overwriting or
    /// appending. A gap between the current data length and `pos` reads
    /// back as zero bytes.
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()>;
}

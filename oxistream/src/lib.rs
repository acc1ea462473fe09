//! # OxiStream
//!
//! Seekable, cached, bit-addressable binary streams.
//!
//! This crate turns a plain forward-only byte source or sink (any
//! [`std::io::Read`] / [`std::io::Write`]) into a randomly seekable
//! stream with bit-level addressing, byte-order-aware primitive codecs,
//! and a mark/reset stack. Bytes are staged in one of two caches: a
//! growable in-memory block cache or an anonymous temporary file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ BitStream<B>                                            │
//! │     byte-order math, bit cursor, mark/reset, flushing   │
//! ├─────────────────────────────────────────────────────────┤
//! │ CacheBackend / WritableBackend                          │
//! │     read_at / write_at / flush_before / close           │
//! ├────────────────────────────┬────────────────────────────┤
//! │ MemoryCacheInput/Output    │ FileCacheInput/Output      │
//! │     8 KiB block list,      │     anonymous tempfile,    │
//! │     FIFO eviction          │     sequential staging     │
//! ├────────────────────────────┴────────────────────────────┤
//! │ forward-only source (Read) / sink (Write)               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads pull from the source lazily, only as far as the requested
//! position; writes are staged in the cache and pushed to the sink by
//! [`BitStream::flush_before`] or at close. The flush boundary is also
//! the eviction boundary: once flushed, positions can no longer be
//! seeked to and their storage may be reclaimed.
//!
//! ## Example
//!
//! ```
//! use oxistream::{MemoryCacheInputStream, Result};
//! use std::io::Cursor;
//!
//! fn main() -> Result<()> {
//!     // Any forward-only reader gains random access.
//!     let source = Cursor::new(vec![0x01, 0x02, 0x03, 0x04, 0b1010_0000]);
//!     let mut stream = MemoryCacheInputStream::new(source);
//!
//!     assert_eq!(stream.read_u32()?, 0x0102_0304);
//!     assert_eq!(stream.read_bits(3)?, 0b101);
//!     stream.seek(0)?;
//!     assert_eq!(stream.read_u16()?, 0x0102);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod error;
pub mod file;
pub mod memcache;
pub mod memory;
pub mod stream;
mod utf;

// Re-exports for convenience
pub use backend::{CacheBackend, WritableBackend};
pub use error::{Result, StreamError};
pub use file::{FileCacheInput, FileCacheInputStream, FileCacheOutput, FileCacheOutputStream};
pub use memcache::{BLOCK_SIZE, MemoryCache};
pub use memory::{
    MemoryCacheInput, MemoryCacheInputStream, MemoryCacheOutput, MemoryCacheOutputStream,
};
pub use stream::{BitStream, ByteOrder};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backend::{CacheBackend, WritableBackend};
    pub use crate::error::{Result, StreamError};
    pub use crate::file::{FileCacheInputStream, FileCacheOutputStream};
    pub use crate::memory::{MemoryCacheInputStream, MemoryCacheOutputStream};
    pub use crate::stream::{BitStream, ByteOrder};
}

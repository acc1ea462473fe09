//! Error types for oxistream operations.
//!
//! This module provides a single error type covering all failure modes of
//! the stream engine and its cache backends: I/O errors from the wrapped
//! source or sink, positional contract violations (seeking below the flush
//! boundary, stale marks, cache addresses outside the resident window),
//! short reads, and string-encoding failures.

use std::io;
use thiserror::Error;

/// The main error type for oxistream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// I/O error from the underlying source, sink, or backing file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream has already been closed.
    #[error("Stream is closed")]
    ClosedStream,

    /// A bad offset, length, or bit count was passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// Attempt to seek below the flushed position.
    #[error("Cannot seek to {requested}: positions below {flushed} have been flushed")]
    SeekBeforeFlushed {
        /// The requested byte position.
        requested: u64,
        /// The current flushed position.
        flushed: u64,
    },

    /// A popped mark points below the flushed position.
    #[error("Marked position {marked} has been flushed (flushed position is {flushed})")]
    StaleMark {
        /// The byte position recorded by the mark.
        marked: u64,
        /// The current flushed position.
        flushed: u64,
    },

    /// End of stream reached during a full-read or typed read.
    #[error("Unexpected end of stream: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// Cache address outside the resident (not disposed, already written)
    /// range.
    #[error("Position {pos} outside resident cache range {start}..{end}")]
    OutOfBounds {
        /// The offending absolute position.
        pos: u64,
        /// First resident position.
        start: u64,
        /// One past the last resident position.
        end: u64,
    },

    /// Malformed or oversized modified UTF-8 data.
    #[error("Malformed modified UTF-8: {message}")]
    UtfFormat {
        /// Description of the encoding problem.
        message: String,
    },

    /// A cache block could not be allocated.
    #[error("Out of cache memory: failed to allocate {bytes} bytes")]
    OutOfCacheMemory {
        /// Size of the failed allocation.
        bytes: usize,
    },
}

/// Result type alias for oxistream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

impl StreamError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a seek-below-flush error.
    pub fn seek_before_flushed(requested: u64, flushed: u64) -> Self {
        Self::SeekBeforeFlushed { requested, flushed }
    }

    /// Create a stale mark error.
    pub fn stale_mark(marked: u64, flushed: u64) -> Self {
        Self::StaleMark { marked, flushed }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create an out-of-bounds cache error.
    pub fn out_of_bounds(pos: u64, start: u64, end: u64) -> Self {
        Self::OutOfBounds { pos, start, end }
    }

    /// Create a modified UTF-8 format error.
    pub fn utf_format(message: impl Into<String>) -> Self {
        Self::UtfFormat {
            message: message.into(),
        }
    }

    /// Create an out-of-cache-memory error.
    pub fn out_of_cache_memory(bytes: usize) -> Self {
        Self::OutOfCacheMemory { bytes }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(inner) => inner,
            StreamError::UnexpectedEof { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err.to_string())
            }
            StreamError::InvalidArgument { .. }
            | StreamError::SeekBeforeFlushed { .. }
            | StreamError::StaleMark { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
            }
            other => io::Error::other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StreamError::seek_before_flushed(10, 20);
        assert!(err.to_string().contains("Cannot seek to 10"));

        let err = StreamError::out_of_bounds(8191, 8192, 20000);
        assert!(err.to_string().contains("8191"));
        assert!(err.to_string().contains("8192..20000"));

        let err = StreamError::utf_format("partial character at end");
        assert!(err.to_string().contains("modified UTF-8"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "sink gone");
        let err: StreamError = io_err.into();
        assert!(matches!(err, StreamError::Io(_)));
    }

    #[test]
    fn test_back_to_io_error() {
        let err = StreamError::unexpected_eof(4);
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
    }
}

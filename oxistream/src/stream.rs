//! The seekable, bit-addressable stream engine.
//!
//! [`BitStream`] layers byte-order-aware primitive decoding, a sub-byte
//! bit cursor, a mark/reset stack, and flush bookkeeping over any
//! [`CacheBackend`]. The engine is pure position arithmetic: every byte of
//! storage I/O goes through the backend, which in turn pulls from or
//! pushes to the wrapped forward-only source or sink on demand.
//!
//! # Positions
//!
//! A stream position is a byte position plus a bit offset in `0..=7`.
//! Byte-granular reads, writes, and seeks reset the bit offset to zero;
//! only bit operations advance it. Bits are addressed MSB-first within a
//! byte, independent of the configured [`ByteOrder`], which governs
//! multi-byte primitive composition only.
//!
//! # Flushing
//!
//! [`BitStream::flush_before`] advances a monotone boundary below which
//! seeking is forbidden and the backend may discard storage (output
//! backends push the range to their sink first). Marks that fall below
//! the boundary become stale and fail on [`BitStream::reset`].
//!
//! # Example
//!
//! ```
//! use oxistream::{ByteOrder, MemoryCacheOutputStream};
//!
//! let mut sink = Vec::new();
//! let mut out = MemoryCacheOutputStream::new(&mut sink);
//! out.write_u32(0x0102_0304).unwrap();
//! out.set_byte_order(ByteOrder::LittleEndian);
//! out.write_u32(0x0102_0304).unwrap();
//! out.close().unwrap();
//! drop(out);
//! assert_eq!(sink, [1, 2, 3, 4, 4, 3, 2, 1]);
//! ```

use std::io;

use crate::backend::{CacheBackend, WritableBackend};
use crate::error::{Result, StreamError};
use crate::utf;

/// Byte significance ordering for multi-byte primitive values.
///
/// Affects the typed `read_*`/`write_*` operations only; bit operations
/// and the modified UTF-8 length prefix are always big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Most significant byte first (network order). The default.
    #[default]
    BigEndian,
    /// Least significant byte first.
    LittleEndian,
}

/// A saved stream position.
#[derive(Debug, Clone, Copy)]
struct Mark {
    byte_pos: u64,
    bit_offset: u8,
}

/// Mask covering the low `n` bits of a `u64`, `n` in `0..=64`.
#[inline]
fn low_mask(n: u32) -> u64 {
    if n == 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// Mask covering the low `n` bits of a byte, `n` in `0..=8`.
#[inline]
fn low_mask8(n: u32) -> u8 {
    (0xFFu16 >> (8 - n)) as u8
}

/// A seekable, bit-addressable stream over a cache backend.
///
/// Reading variants are available for any [`CacheBackend`]; writing
/// variants additionally require [`WritableBackend`], so read-only
/// streams reject writes at compile time rather than at run time.
///
/// Closing is idempotent and also happens on drop; whichever runs first
/// performs the backend teardown (and, for output backends, the final
/// push to the sink), the other is a no-op.
#[derive(Debug)]
pub struct BitStream<B: CacheBackend> {
    backend: B,
    byte_pos: u64,
    bit_offset: u8,
    flushed_pos: u64,
    order: ByteOrder,
    marks: Vec<Mark>,
    closed: bool,
}

impl<B: CacheBackend> BitStream<B> {
    /// Wrap a backend in a stream positioned at zero.
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            byte_pos: 0,
            bit_offset: 0,
            flushed_pos: 0,
            order: ByteOrder::BigEndian,
            marks: Vec::new(),
            closed: false,
        }
    }

    #[inline]
    fn check_closed(&self) -> Result<()> {
        if self.closed {
            Err(StreamError::ClosedStream)
        } else {
            Ok(())
        }
    }

    /// Current byte order for multi-byte primitives.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Set the byte order for subsequent multi-byte primitives.
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// Current byte position.
    pub fn position(&self) -> u64 {
        self.byte_pos
    }

    /// Current bit offset within the current byte, `0..=7`.
    pub fn bit_offset(&self) -> u8 {
        self.bit_offset
    }

    /// Set the bit offset without moving the byte position.
    ///
    /// Fails with `InvalidArgument` unless `offset` is in `0..=7`.
    pub fn set_bit_offset(&mut self, offset: u8) -> Result<()> {
        self.check_closed()?;
        if offset > 7 {
            return Err(StreamError::invalid_argument(format!(
                "bit offset {offset} outside 0..=7"
            )));
        }
        self.bit_offset = offset;
        Ok(())
    }

    /// The flush boundary: positions below it cannot be seeked to and may
    /// have been discarded by the backend. Non-decreasing.
    pub fn flushed_position(&self) -> u64 {
        self.flushed_pos
    }

    /// Total data length, when the backend knows it.
    ///
    /// Output streams report the write high-water mark; input streams
    /// return `None` because the wrapped source's length is unknown.
    pub fn length(&self) -> Option<u64> {
        self.backend.stream_length()
    }

    /// Whether the stream caches data. True for both backend families.
    pub fn is_cached(&self) -> bool {
        self.backend.is_cached()
    }

    /// Whether cached data lives in a backing file.
    pub fn is_cached_file(&self) -> bool {
        self.backend.is_cached_file()
    }

    /// Whether cached data lives in main memory.
    pub fn is_cached_memory(&self) -> bool {
        self.backend.is_cached_memory()
    }

    /// Read one byte, or `None` at end of data. Resets the bit cursor.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        self.check_closed()?;
        self.bit_offset = 0;
        let mut b = [0u8; 1];
        if self.backend.read_at(self.byte_pos, &mut b)? == 0 {
            return Ok(None);
        }
        self.byte_pos += 1;
        Ok(Some(b[0]))
    }

    /// Read up to `buf.len()` bytes. Resets the bit cursor.
    ///
    /// Returns the number of bytes read; `0` means end of data. A short
    /// count can only occur at end of data.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_closed()?;
        self.bit_offset = 0;
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.backend.read_at(self.byte_pos, buf)?;
        self.byte_pos += n as u64;
        Ok(n)
    }

    /// Fill `buf` completely, failing with `UnexpectedEof` if the data
    /// ends first.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_bytes(&mut buf[filled..])?;
            if n == 0 {
                return Err(StreamError::unexpected_eof(buf.len() - filled));
            }
            filled += n;
        }
        Ok(())
    }

    /// Read one byte, failing with `UnexpectedEof` at end of data.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_byte()?
            .ok_or_else(|| StreamError::unexpected_eof(1))
    }

    /// Read one signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a 16-bit unsigned integer in the current byte order.
    pub fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_fully(&mut b)?;
        Ok(match self.order {
            ByteOrder::BigEndian => u16::from_be_bytes(b),
            ByteOrder::LittleEndian => u16::from_le_bytes(b),
        })
    }

    /// Read a 16-bit signed integer in the current byte order.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Read a 32-bit unsigned integer in the current byte order.
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_fully(&mut b)?;
        Ok(match self.order {
            ByteOrder::BigEndian => u32::from_be_bytes(b),
            ByteOrder::LittleEndian => u32::from_le_bytes(b),
        })
    }

    /// Read a 32-bit signed integer in the current byte order.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a 64-bit unsigned integer in the current byte order.
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_fully(&mut b)?;
        Ok(match self.order {
            ByteOrder::BigEndian => u64::from_be_bytes(b),
            ByteOrder::LittleEndian => u64::from_le_bytes(b),
        })
    }

    /// Read a 64-bit signed integer in the current byte order.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Read a 32-bit IEEE 754 float in the current byte order.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Read a 64-bit IEEE 754 float in the current byte order.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a line of Latin-1 text.
    ///
    /// Bytes are consumed until `\n` or end of data; a `\r` also
    /// terminates the line, additionally consuming an immediately
    /// following `\n`. The terminator is not included. Returns `None`
    /// only when end of data is hit before any byte is read.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        self.check_closed()?;
        let mut line = String::new();
        loop {
            match self.read_byte()? {
                None => {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Some(b'\n') => break,
                Some(b'\r') => {
                    // Peek one byte and un-read it unless it is \n.
                    if let Some(next) = self.read_byte()? {
                        if next != b'\n' {
                            let back = self.byte_pos - 1;
                            self.seek(back)?;
                        }
                    }
                    break;
                }
                Some(b) => line.push(b as char),
            }
        }
        Ok(Some(line))
    }

    /// Read a length-prefixed modified UTF-8 string.
    ///
    /// The two-byte length prefix is always big-endian, regardless of the
    /// configured byte order, which is restored afterwards either way.
    /// Truncated data fails `UnexpectedEof`; malformed code units fail
    /// `UtfFormat`.
    pub fn read_utf(&mut self) -> Result<String> {
        self.check_closed()?;
        let saved = self.order;
        self.order = ByteOrder::BigEndian;
        let result = self.read_utf_inner();
        self.order = saved;
        result
    }

    fn read_utf_inner(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let mut buf = vec![0u8; len];
        self.read_fully(&mut buf)?;
        utf::decode(&buf)
    }

    /// Read a single bit at the current bit cursor.
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Read `num_bits` bits MSB-first, `num_bits` in `0..=64`.
    ///
    /// The bits land in the low positions of the result, as if read one
    /// bit at a time and shifted in from the right. The byte order
    /// setting has no effect. Fails `InvalidArgument` for counts above 64
    /// and `UnexpectedEof` when the spanned bytes run out.
    pub fn read_bits(&mut self, num_bits: u32) -> Result<u64> {
        self.check_closed()?;
        if num_bits > 64 {
            return Err(StreamError::invalid_argument(format!(
                "bit count {num_bits} outside 0..=64"
            )));
        }
        if num_bits == 0 {
            return Ok(0);
        }

        // Accumulate every byte the bit range touches, including the
        // cursor bits on the left. 7 + 64 bits can span nine bytes, hence
        // the wide accumulator.
        let offset = self.bit_offset as u32;
        let total = num_bits + offset;
        let mut accum: u128 = 0;
        for _ in 0..total.div_ceil(8) {
            let byte = self
                .read_byte()?
                .ok_or_else(|| StreamError::unexpected_eof(1))?;
            accum = (accum << 8) | byte as u128;
        }

        let overread = total.div_ceil(8) * 8 - total;
        let result = ((accum >> overread) as u64) & low_mask(num_bits);

        // Leave the position on the byte holding the next unread bit.
        let new_offset = (total % 8) as u8;
        if new_offset != 0 {
            let back = self.byte_pos - 1;
            self.seek(back)?;
        }
        self.bit_offset = new_offset;
        Ok(result)
    }

    /// Push the current position onto the mark stack.
    pub fn mark(&mut self) -> Result<()> {
        self.check_closed()?;
        self.marks.push(Mark {
            byte_pos: self.byte_pos,
            bit_offset: self.bit_offset,
        });
        Ok(())
    }

    /// Pop the most recent mark and restore its position.
    ///
    /// A `reset` with no outstanding mark is a no-op. Fails `StaleMark`
    /// when the popped position has been flushed away.
    pub fn reset(&mut self) -> Result<()> {
        self.check_closed()?;
        let Some(mark) = self.marks.pop() else {
            return Ok(());
        };
        if mark.byte_pos < self.flushed_pos {
            return Err(StreamError::stale_mark(mark.byte_pos, self.flushed_pos));
        }
        self.byte_pos = mark.byte_pos;
        self.bit_offset = mark.bit_offset;
        Ok(())
    }

    /// Move to the absolute byte position `pos` and clear the bit cursor.
    ///
    /// Fails `SeekBeforeFlushed` below the flush boundary. Seeking past
    /// the current data length is legal; a later read there reports end
    /// of data.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.check_closed()?;
        if pos < self.flushed_pos {
            return Err(StreamError::seek_before_flushed(pos, self.flushed_pos));
        }
        self.byte_pos = pos;
        self.bit_offset = 0;
        Ok(())
    }

    /// Skip `n` bytes forward. Equivalent to `seek(position() + n)`;
    /// returns the number of bytes skipped.
    pub fn skip_bytes(&mut self, n: u64) -> Result<u64> {
        let target = self.byte_pos + n;
        self.seek(target)?;
        Ok(n)
    }

    /// Advance the flush boundary to `pos`.
    ///
    /// Requires `flushed_position() <= pos <= position()`, else
    /// `InvalidArgument`. Output backends push the range to the sink and
    /// evict it; a backend failure leaves the boundary unchanged.
    pub fn flush_before(&mut self, pos: u64) -> Result<()> {
        self.check_closed()?;
        if pos < self.flushed_pos || pos > self.byte_pos {
            return Err(StreamError::invalid_argument(format!(
                "flush position {pos} outside {}..={}",
                self.flushed_pos, self.byte_pos
            )));
        }
        self.backend.flush_before(self.flushed_pos, pos)?;
        self.flushed_pos = pos;
        Ok(())
    }

    /// Flush everything below the current position.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_before(self.byte_pos)
    }

    /// Close the stream, tearing the backend down exactly once.
    ///
    /// Output backends first push all unflushed data to the sink, so sink
    /// errors surface here; storage cleanup itself is best-effort. A
    /// second `close` is a no-op returning `Ok`, and dropping an unclosed
    /// stream performs the same teardown with errors discarded.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.backend.close(self.flushed_pos)
    }

    /// The byte at `pos` if it has been made valid by a write or load.
    fn read_back(&mut self, pos: u64) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        if self.backend.read_at(pos, &mut b)? == 0 {
            Ok(None)
        } else {
            Ok(Some(b[0]))
        }
    }
}

impl<B: WritableBackend> BitStream<B> {
    /// Write all of `buf` at the current position.
    ///
    /// A pending partial byte from bit writes is committed first, with
    /// its never-written bits zero-filled.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.flush_bits()?;
        if buf.is_empty() {
            return Ok(());
        }
        self.backend.write_at(self.byte_pos, buf)?;
        self.byte_pos += buf.len() as u64;
        Ok(())
    }

    /// Write a single byte.
    pub fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    /// Write an unsigned byte. Alias of [`BitStream::write_byte`] for
    /// symmetry with the typed readers.
    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_byte(v)
    }

    /// Write a signed byte.
    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_byte(v as u8)
    }

    /// Write a 16-bit unsigned integer in the current byte order.
    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        let b = match self.order {
            ByteOrder::BigEndian => v.to_be_bytes(),
            ByteOrder::LittleEndian => v.to_le_bytes(),
        };
        self.write_bytes(&b)
    }

    /// Write a 16-bit signed integer in the current byte order.
    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.write_u16(v as u16)
    }

    /// Write a 32-bit unsigned integer in the current byte order.
    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        let b = match self.order {
            ByteOrder::BigEndian => v.to_be_bytes(),
            ByteOrder::LittleEndian => v.to_le_bytes(),
        };
        self.write_bytes(&b)
    }

    /// Write a 32-bit signed integer in the current byte order.
    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_u32(v as u32)
    }

    /// Write a 64-bit unsigned integer in the current byte order.
    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        let b = match self.order {
            ByteOrder::BigEndian => v.to_be_bytes(),
            ByteOrder::LittleEndian => v.to_le_bytes(),
        };
        self.write_bytes(&b)
    }

    /// Write a 64-bit signed integer in the current byte order.
    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_u64(v as u64)
    }

    /// Write a 32-bit IEEE 754 float in the current byte order.
    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_u32(v.to_bits())
    }

    /// Write a 64-bit IEEE 754 float in the current byte order.
    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_u64(v.to_bits())
    }

    /// Write a length-prefixed modified UTF-8 string.
    ///
    /// The two-byte byte-count prefix is always big-endian; the
    /// configured byte order is restored afterwards either way. Fails
    /// `UtfFormat` when the encoding exceeds 65535 bytes.
    pub fn write_utf(&mut self, s: &str) -> Result<()> {
        self.check_closed()?;
        let encoded = utf::encode(s);
        if encoded.len() > u16::MAX as usize {
            return Err(StreamError::utf_format(format!(
                "encoded length {} exceeds 65535 bytes",
                encoded.len()
            )));
        }
        let saved = self.order;
        self.order = ByteOrder::BigEndian;
        let result = self
            .write_u16(encoded.len() as u16)
            .and_then(|_| self.write_bytes(&encoded));
        self.order = saved;
        result
    }

    /// Write a single bit at the current bit cursor.
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits(bit as u64, 1)
    }

    /// Write the low `num_bits` bits of `bits` MSB-first, `num_bits` in
    /// `0..=64`.
    ///
    /// Partial bytes are merged rather than overwritten: bits of the
    /// affected bytes outside the written range keep their previous value
    /// when the byte already exists in the stream, and read as zero when
    /// it does not. The byte order setting has no effect.
    pub fn write_bits(&mut self, bits: u64, num_bits: u32) -> Result<()> {
        self.check_closed()?;
        if num_bits > 64 {
            return Err(StreamError::invalid_argument(format!(
                "bit count {num_bits} outside 0..=64"
            )));
        }
        if num_bits == 0 {
            return Ok(());
        }
        let bits = bits & low_mask(num_bits);
        let mut remaining = num_bits;
        let mut pos = self.byte_pos;
        let mut cursor = self.bit_offset as u32;

        // Leading partial byte: the write starts mid-byte, or is shorter
        // than one byte.
        if cursor != 0 || remaining < 8 {
            let take = remaining.min(8 - cursor);
            let shift = 8 - cursor - take;
            let mask = low_mask8(take);
            let chunk = ((bits >> (remaining - take)) as u8) & mask;
            let existing = self.read_back(pos)?.unwrap_or(0);
            let merged = (existing & !(mask << shift)) | (chunk << shift);
            self.backend.write_at(pos, &[merged])?;
            remaining -= take;
            cursor += take;
            if cursor == 8 {
                pos += 1;
                cursor = 0;
            }
        }

        // Whole bytes.
        while remaining >= 8 {
            let byte = ((bits >> (remaining - 8)) & 0xFF) as u8;
            self.backend.write_at(pos, &[byte])?;
            pos += 1;
            remaining -= 8;
        }

        // Trailing partial byte. An existing byte keeps its low bits; a
        // never-written byte zero-fills them.
        if remaining > 0 {
            let mask = low_mask8(remaining);
            let shift = 8 - remaining;
            let chunk = (bits as u8) & mask;
            let existing = self.read_back(pos)?.unwrap_or(0);
            let merged = (existing & !(mask << shift)) | (chunk << shift);
            self.backend.write_at(pos, &[merged])?;
            cursor = remaining;
        }

        self.byte_pos = pos;
        self.bit_offset = cursor as u8;
        Ok(())
    }

    /// Commit a pending partial byte before a byte-granular write.
    ///
    /// The bits below the cursor keep the value the bit writes gave them;
    /// every bit at or past the cursor is forced to zero, even if the
    /// byte previously held data there. The position advances past the
    /// committed byte.
    fn flush_bits(&mut self) -> Result<()> {
        if self.bit_offset != 0 {
            let offset = self.bit_offset as u32;
            let merged = match self.read_back(self.byte_pos)? {
                Some(b) => b & (0xFFu8 << (8 - offset)),
                None => 0,
            };
            self.backend.write_at(self.byte_pos, &[merged])?;
            self.byte_pos += 1;
            self.bit_offset = 0;
        }
        Ok(())
    }
}

impl<B: CacheBackend> Drop for BitStream<B> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.backend.close(self.flushed_pos);
        }
    }
}

impl<B: CacheBackend> io::Read for BitStream<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}

impl<B: WritableBackend> io::Write for BitStream<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(BitStream::flush(self)?)
    }
}

impl<B: CacheBackend> io::Seek for BitStream<B> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(p) => p,
            io::SeekFrom::Current(delta) => self
                .byte_pos
                .checked_add_signed(delta)
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek before position zero")
                })?,
            io::SeekFrom::End(delta) => {
                let len = self.length().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::Unsupported,
                        "stream length is unknown, cannot seek from end",
                    )
                })?;
                len.checked_add_signed(delta).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek before position zero")
                })?
            }
        };
        BitStream::seek(self, target)?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCacheInputStream, MemoryCacheOutputStream};
    use std::io::Cursor;

    fn input(data: &[u8]) -> MemoryCacheInputStream<Cursor<Vec<u8>>> {
        MemoryCacheInputStream::new(Cursor::new(data.to_vec()))
    }

    #[test]
    fn test_typed_roundtrip_both_orders() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let mut sink = Vec::new();
            let mut out = MemoryCacheOutputStream::new(&mut sink);
            out.set_byte_order(order);
            out.write_u16(0xBEEF).unwrap();
            out.write_i16(-12345).unwrap();
            out.write_u32(0xDEAD_BEEF).unwrap();
            out.write_i32(i32::MIN + 7).unwrap();
            out.write_u64(0x0123_4567_89AB_CDEF).unwrap();
            out.write_i64(-1).unwrap();
            out.write_f32(3.5).unwrap();
            out.write_f64(-0.125).unwrap();

            out.seek(0).unwrap();
            assert_eq!(out.read_u16().unwrap(), 0xBEEF);
            assert_eq!(out.read_i16().unwrap(), -12345);
            assert_eq!(out.read_u32().unwrap(), 0xDEAD_BEEF);
            assert_eq!(out.read_i32().unwrap(), i32::MIN + 7);
            assert_eq!(out.read_u64().unwrap(), 0x0123_4567_89AB_CDEF);
            assert_eq!(out.read_i64().unwrap(), -1);
            assert_eq!(out.read_f32().unwrap(), 3.5);
            assert_eq!(out.read_f64().unwrap(), -0.125);
        }
    }

    #[test]
    fn test_byte_order_layout() {
        let mut sink = Vec::new();
        let mut out = MemoryCacheOutputStream::new(&mut sink);
        out.write_u32(0x0102_0304).unwrap();
        out.set_byte_order(ByteOrder::LittleEndian);
        out.write_u32(0x0102_0304).unwrap();
        out.close().unwrap();
        drop(out);
        assert_eq!(sink, [1, 2, 3, 4, 4, 3, 2, 1]);
    }

    #[test]
    fn test_read_bits_msb_first() {
        let mut stream = input(&[0b1011_0101, 0b1100_0011]);
        assert_eq!(stream.read_bits(3).unwrap(), 0b101);
        assert_eq!(stream.bit_offset(), 3);
        assert_eq!(stream.read_bits(9).unwrap(), 0b1_0101_1100);
        assert_eq!(stream.position(), 1);
        assert_eq!(stream.bit_offset(), 4);
        assert_eq!(stream.read_bits(4).unwrap(), 0b0011);
    }

    #[test]
    fn test_read_bits_64_with_offset() {
        // Nine bytes; skip seven bits, then read 64 spanning all of them.
        let data = [0x80, 0, 0, 0, 0, 0, 0, 0, 0x01];
        let mut stream = input(&data);
        assert_eq!(stream.read_bits(7).unwrap(), 0b100_0000);
        let v = stream.read_bits(64).unwrap();
        // Remaining bits: the final 0 of byte 0, then 56 zeros, then 0x01
        // minus its last bit still unread.
        assert_eq!(v, 0);
        assert_eq!(stream.bit_offset(), 7);
        assert_eq!(stream.read_bits(1).unwrap(), 1);
    }

    #[test]
    fn test_bits_roundtrip_all_widths() {
        let pattern = 0xA5A5_5A5A_0F0F_F0F0u64;
        for n in 0..=64u32 {
            let mut sink = Vec::new();
            let mut out = MemoryCacheOutputStream::new(&mut sink);
            let expected = pattern & low_mask(n);
            out.write_bits(pattern, n).unwrap();
            out.seek(0).unwrap();
            assert_eq!(out.read_bits(n).unwrap(), expected, "width {n}");
        }
    }

    #[test]
    fn test_bits_roundtrip_at_offsets() {
        for offset in 0..8u8 {
            let mut sink = Vec::new();
            let mut out = MemoryCacheOutputStream::new(&mut sink);
            out.set_bit_offset(offset).unwrap();
            out.write_bits(0b1_0110, 5).unwrap();

            out.seek(0).unwrap();
            out.set_bit_offset(offset).unwrap();
            assert_eq!(out.read_bits(5).unwrap(), 0b1_0110, "offset {offset}");
        }
    }

    #[test]
    fn test_partial_bit_write_preserves_existing() {
        let mut sink = Vec::new();
        let mut out = MemoryCacheOutputStream::new(&mut sink);
        out.write_byte(0xFF).unwrap();
        out.seek(0).unwrap();
        out.write_bits(0b000, 3).unwrap();
        out.seek(0).unwrap();
        // Top three bits cleared, low five preserved.
        assert_eq!(out.read_u8().unwrap(), 0b0001_1111);
    }

    #[test]
    fn test_bit_write_at_eof_zero_fills() {
        let mut sink = Vec::new();
        let mut out = MemoryCacheOutputStream::new(&mut sink);
        out.set_bit_offset(5).unwrap();
        out.write_bits(0b101, 3).unwrap();
        out.seek(0).unwrap();
        assert_eq!(out.read_u8().unwrap(), 0b0000_0101);
    }

    #[test]
    fn test_flush_bits_zero_pads_on_byte_write() {
        let mut sink = Vec::new();
        let mut out = MemoryCacheOutputStream::new(&mut sink);
        out.write_bits(0b11, 2).unwrap();
        assert_eq!(out.bit_offset(), 2);
        out.write_byte(0xAB).unwrap();
        // The partial byte committed as 11000000, then 0xAB after it.
        out.seek(0).unwrap();
        assert_eq!(out.read_u8().unwrap(), 0b1100_0000);
        assert_eq!(out.read_u8().unwrap(), 0xAB);
    }

    #[test]
    fn test_read_bits_rejects_bad_count() {
        let mut stream = input(&[0; 16]);
        assert!(matches!(
            stream.read_bits(65),
            Err(StreamError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_read_bits_eof() {
        let mut stream = input(&[0xFF]);
        assert!(matches!(
            stream.read_bits(9),
            Err(StreamError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_mark_reset_lifo() {
        let mut stream = input(&(0..32u8).collect::<Vec<_>>());
        stream.mark().unwrap(); // position 0
        stream.seek(10).unwrap();
        stream.read_bits(3).unwrap();
        stream.mark().unwrap(); // position 10, offset 3
        stream.seek(20).unwrap();
        stream.mark().unwrap(); // position 20

        stream.seek(31).unwrap();
        stream.reset().unwrap();
        assert_eq!(stream.position(), 20);
        stream.reset().unwrap();
        assert_eq!((stream.position(), stream.bit_offset()), (10, 3));
        stream.reset().unwrap();
        assert_eq!(stream.position(), 0);

        // Underflow is a no-op.
        stream.reset().unwrap();
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_stale_mark() {
        let mut stream = input(&[0; 64]);
        stream.mark().unwrap();
        stream.seek(32).unwrap();
        stream.flush_before(16).unwrap();
        assert!(matches!(
            stream.reset(),
            Err(StreamError::StaleMark { marked: 0, flushed: 16 })
        ));
    }

    #[test]
    fn test_seek_below_flush_boundary() {
        let mut stream = input(&[0; 64]);
        stream.seek(40).unwrap();
        stream.flush_before(24).unwrap();
        assert!(matches!(
            stream.seek(23),
            Err(StreamError::SeekBeforeFlushed { requested: 23, flushed: 24 })
        ));
        stream.seek(24).unwrap();
    }

    #[test]
    fn test_flush_before_validation() {
        let mut stream = input(&[0; 64]);
        stream.seek(10).unwrap();
        stream.flush_before(8).unwrap();
        // Below the boundary or above the position are both rejected and
        // the boundary does not move.
        assert!(stream.flush_before(4).is_err());
        assert!(stream.flush_before(11).is_err());
        assert_eq!(stream.flushed_position(), 8);
        stream.flush_before(8).unwrap();
    }

    #[test]
    fn test_seek_past_end_then_read() {
        let mut stream = input(&[1, 2, 3]);
        stream.seek(100).unwrap();
        assert_eq!(stream.read_byte().unwrap(), None);
        let mut buf = [0u8; 4];
        assert!(matches!(
            stream.read_fully(&mut buf),
            Err(StreamError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_skip_bytes_resets_bit_cursor() {
        let mut stream = input(&[0; 16]);
        stream.read_bits(5).unwrap();
        assert_eq!(stream.skip_bytes(3).unwrap(), 3);
        assert_eq!(stream.position(), 3);
        assert_eq!(stream.bit_offset(), 0);
    }

    #[test]
    fn test_read_line_variants() {
        let mut stream = input(b"one\ntwo\r\nthree\rfour");
        assert_eq!(stream.read_line().unwrap().unwrap(), "one");
        assert_eq!(stream.read_line().unwrap().unwrap(), "two");
        assert_eq!(stream.read_line().unwrap().unwrap(), "three");
        assert_eq!(stream.read_line().unwrap().unwrap(), "four");
        assert_eq!(stream.read_line().unwrap(), None);
    }

    #[test]
    fn test_read_line_latin1() {
        let mut stream = input(&[b'a', 0xE9, b'b', b'\n']);
        assert_eq!(stream.read_line().unwrap().unwrap(), "a\u{e9}b");
    }

    #[test]
    fn test_utf_roundtrip_ignores_byte_order() {
        let mut sink = Vec::new();
        let mut out = MemoryCacheOutputStream::new(&mut sink);
        out.set_byte_order(ByteOrder::LittleEndian);
        out.write_utf("caf\u{e9}\0\u{1F600}").unwrap();
        assert_eq!(out.byte_order(), ByteOrder::LittleEndian);

        out.seek(0).unwrap();
        assert_eq!(out.read_utf().unwrap(), "caf\u{e9}\0\u{1F600}");
        assert_eq!(out.byte_order(), ByteOrder::LittleEndian);

        // The length prefix is big-endian even under little-endian order.
        out.seek(0).unwrap();
        out.set_byte_order(ByteOrder::BigEndian);
        let len = out.read_u16().unwrap();
        assert_eq!(len, 3 + 2 + 2 + 6);
    }

    #[test]
    fn test_write_utf_too_long() {
        let mut sink = Vec::new();
        let mut out = MemoryCacheOutputStream::new(&mut sink);
        let s = "\u{3042}".repeat(22000); // 66000 encoded bytes
        assert!(matches!(
            out.write_utf(&s),
            Err(StreamError::UtfFormat { .. })
        ));
    }

    #[test]
    fn test_closed_stream_rejects_everything() {
        let mut stream = input(&[0; 8]);
        stream.close().unwrap();
        assert!(matches!(stream.read_byte(), Err(StreamError::ClosedStream)));
        assert!(matches!(stream.seek(0), Err(StreamError::ClosedStream)));
        assert!(matches!(stream.mark(), Err(StreamError::ClosedStream)));
        assert!(matches!(
            stream.read_bits(1),
            Err(StreamError::ClosedStream)
        ));
        // Closing again is harmless.
        stream.close().unwrap();
    }

    #[test]
    fn test_io_trait_bridges() {
        use std::io::{Read, Seek, SeekFrom, Write};

        let mut sink = Vec::new();
        let mut out = MemoryCacheOutputStream::new(&mut sink);
        out.write_all(b"hello world").unwrap();
        // The inherent seek takes a plain position, so the trait form
        // needs qualification.
        Seek::seek(&mut out, SeekFrom::Start(6)).unwrap();
        let mut buf = [0u8; 5];
        out.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"world");

        // SeekFrom::End works because output streams know their length.
        assert_eq!(Seek::seek(&mut out, SeekFrom::End(-1)).unwrap(), 10);

        // Input streams have unknown length.
        let mut stream = input(&[0; 4]);
        assert!(Seek::seek(&mut stream, SeekFrom::End(0)).is_err());
        assert_eq!(Seek::seek(&mut stream, SeekFrom::Current(2)).unwrap(), 2);
    }
}

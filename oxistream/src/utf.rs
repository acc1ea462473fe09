//! Modified UTF-8 encoding, as used by the length-prefixed string
//! operations on [`crate::BitStream`].
//!
//! Modified UTF-8 differs from standard UTF-8 in two ways: U+0000 is
//! encoded as the two-byte sequence `C0 80` (so encoded strings never
//! contain a NUL byte), and characters outside the BMP are encoded as a
//! CESU-8 surrogate pair, each half as a three-byte sequence. Four-byte
//! sequences never appear.

use crate::error::{Result, StreamError};

/// Encode `s` as modified UTF-8 code units.
pub(crate) fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        let cp = c as u32;
        match cp {
            0x01..=0x7F => out.push(cp as u8),
            0x00 | 0x80..=0x7FF => {
                out.push(0xC0 | (cp >> 6) as u8);
                out.push(0x80 | (cp & 0x3F) as u8);
            }
            0x800..=0xFFFF => push3(&mut out, cp),
            _ => {
                // Surrogate pair, each half as a three-byte sequence.
                let v = cp - 0x1_0000;
                push3(&mut out, 0xD800 + (v >> 10));
                push3(&mut out, 0xDC00 + (v & 0x3FF));
            }
        }
    }
    out
}

fn push3(out: &mut Vec<u8>, cp: u32) {
    out.push(0xE0 | (cp >> 12) as u8);
    out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
    out.push(0x80 | (cp & 0x3F) as u8);
}

/// Decode modified UTF-8 `bytes` into a string.
///
/// Fails with [`StreamError::UtfFormat`] on malformed lead or continuation
/// bytes, on a multi-byte sequence truncated by the end of the input, and
/// on surrogate halves that do not pair up.
pub(crate) fn decode(bytes: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let a = bytes[i];
        match a {
            0x00..=0x7F => {
                units.push(a as u16);
                i += 1;
            }
            0xC0..=0xDF => {
                let b = continuation(bytes, i + 1)?;
                units.push(((a as u16 & 0x1F) << 6) | (b as u16 & 0x3F));
                i += 2;
            }
            0xE0..=0xEF => {
                let b = continuation(bytes, i + 1)?;
                let c = continuation(bytes, i + 2)?;
                units.push(((a as u16 & 0x0F) << 12) | ((b as u16 & 0x3F) << 6) | (c as u16 & 0x3F));
                i += 3;
            }
            _ => {
                return Err(StreamError::utf_format(format!(
                    "bad lead byte {a:#04x} at offset {i}"
                )));
            }
        }
    }
    String::from_utf16(&units)
        .map_err(|_| StreamError::utf_format("unpaired surrogate".to_string()))
}

fn continuation(bytes: &[u8], i: usize) -> Result<u8> {
    match bytes.get(i) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(b),
        Some(&b) => Err(StreamError::utf_format(format!(
            "bad continuation byte {b:#04x} at offset {i}"
        ))),
        None => Err(StreamError::utf_format(
            "partial character at end of input".to_string(),
        )),
    }
}

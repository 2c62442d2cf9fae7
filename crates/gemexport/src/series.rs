//! Encoded series-key codec.
//!
//! The merge-set index stores one canonical binary key per distinct
//! measurement + tag set. All lengths are little-endian u16:
//!
//! ```text
//! ┌──────────┬──────────┬────────┬───────────┬─────────────────────────────┐
//! │ total    │ ms-len   │ ms     │ tag-count │ (key-len, key,              │
//! │ (2 bytes)│ (2 bytes)│ (N)    │ (2 bytes) │  val-len, val) × tag-count  │
//! └──────────┴──────────┴────────┴───────────┴─────────────────────────────┘
//! ```
//!
//! `total` is the byte length of everything after the total field itself.
//! Decoders must reject keys whose declared lengths run past the buffer.

use crate::error::{ExportError, Result};
use crate::record::Tag;

/// A decoded series key: measurement name plus sorted tag pairs.
///
/// The measurement name is returned as stored, i.e. with the storage-layer
/// version suffix still attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesKey {
    /// Measurement name, including the version suffix.
    pub measurement: String,
    /// Tag pairs in stored (sorted) order.
    pub tags: Vec<Tag>,
}

/// Encodes a series key into its canonical binary form.
pub fn encode_series_key(measurement: &str, tags: &[Tag]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + measurement.len() + tags.len() * 8);

    // Measurement (length-prefixed)
    body.extend_from_slice(&(measurement.len() as u16).to_le_bytes());
    body.extend_from_slice(measurement.as_bytes());

    // Tag count (2 bytes)
    body.extend_from_slice(&(tags.len() as u16).to_le_bytes());
    for tag in tags {
        body.extend_from_slice(&(tag.key.len() as u16).to_le_bytes());
        body.extend_from_slice(tag.key.as_bytes());
        body.extend_from_slice(&(tag.value.len() as u16).to_le_bytes());
        body.extend_from_slice(tag.value.as_bytes());
    }

    let mut key = Vec::with_capacity(2 + body.len());
    key.extend_from_slice(&(body.len() as u16).to_le_bytes());
    key.extend_from_slice(&body);
    key
}

/// Decodes a canonical binary series key.
///
/// # Errors
///
/// Returns `ExportError::CorruptIndex` if any declared length runs past the
/// end of the buffer or an embedded string is not valid UTF-8.
pub fn decode_series_key(key: &[u8]) -> Result<SeriesKey> {
    let mut cursor = Cursor::new(key);

    let total = cursor.read_u16()? as usize;
    if cursor.remaining() < total {
        return Err(ExportError::CorruptIndex(format!(
            "series key declares {} bytes, {} available",
            total,
            cursor.remaining()
        )));
    }

    let measurement = cursor.read_string()?;
    let tag_count = cursor.read_u16()?;

    let mut tags = Vec::with_capacity(tag_count as usize);
    for _ in 0..tag_count {
        let tag_key = cursor.read_string()?;
        let tag_value = cursor.read_string()?;
        tags.push(Tag::new(tag_key, tag_value));
    }

    Ok(SeriesKey { measurement, tags })
}

/// Bounds-checked slice reader for series-key decoding.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u16(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(ExportError::CorruptIndex(
                "series key truncated reading length".to_string(),
            ));
        }
        let value = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        if self.remaining() < len {
            return Err(ExportError::CorruptIndex(format!(
                "series key truncated: need {} bytes, {} available",
                len,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ExportError::CorruptIndex(format!("invalid UTF-8 in series key: {}", e)))
    }
}

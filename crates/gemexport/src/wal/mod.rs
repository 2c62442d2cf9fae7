//! Write-Ahead Log (WAL) frame decoding.
//!
//! A WAL file is a sequence of length-framed, Snappy-compressed row batches:
//!
//! ```text
//! ┌───────────┬────────────────────────────┬───────────────────┐
//! │ type      │ compressed body length     │ compressed body   │
//! │ (1 byte)  │ (4 bytes, big-endian u32)  │ (Snappy block)    │
//! └───────────┴────────────────────────────┴───────────────────┘
//! ```
//!
//! A WAL file may be partially written: truncation is not an error. On any
//! short read, Snappy failure, or row-batch decode failure the reader logs
//! the file path and offset and treats the file as ended. An empty file
//! yields no rows and no error.
//!
//! The decompressed body is a self-describing batch of rows; see
//! [`marshal_rows`] / [`unmarshal_rows`] for the layout. The frame writer
//! counterpart ([`write_frame`]) serves the test suite and fixture tooling.

use crate::error::{ExportError, Result};
use crate::record::{Field, FieldType, FieldValue, Row, Tag};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File extension of WAL files.
pub const WAL_FILE_EXTENSION: &str = "wal";

/// Size of the per-frame header: 1 type byte + 4 length bytes.
pub const WAL_RECORD_HEADER_SIZE: usize = 5;

/// Frame type tag for line-protocol row batches.
pub const WAL_RECORD_TYPE_ROWS: u8 = 1;

/// Serializes a row batch into the uncompressed WAL body layout.
///
/// ```text
/// row_count (u32 LE)
/// per row:
///   name_len (u16 LE) + name            (with version suffix)
///   tag_count (u16 LE) + (key_len u16 + key + val_len u16 + val) × tag_count
///   field_count (u16 LE) + (key_len u16 + key + type u8 + value) × field_count
///   timestamp (i64 LE)
/// value encoding: Float f64 LE | Integer i64 LE | Boolean u8 | String u32 LE len + bytes
/// ```
pub fn marshal_rows(rows: &[Row]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(rows.len() as u32).to_le_bytes());

    for row in rows {
        buf.extend_from_slice(&(row.name.len() as u16).to_le_bytes());
        buf.extend_from_slice(row.name.as_bytes());

        buf.extend_from_slice(&(row.tags.len() as u16).to_le_bytes());
        for tag in &row.tags {
            buf.extend_from_slice(&(tag.key.len() as u16).to_le_bytes());
            buf.extend_from_slice(tag.key.as_bytes());
            buf.extend_from_slice(&(tag.value.len() as u16).to_le_bytes());
            buf.extend_from_slice(tag.value.as_bytes());
        }

        buf.extend_from_slice(&(row.fields.len() as u16).to_le_bytes());
        for field in &row.fields {
            buf.extend_from_slice(&(field.key.len() as u16).to_le_bytes());
            buf.extend_from_slice(field.key.as_bytes());
            buf.push(field.value.field_type() as u8);
            match &field.value {
                FieldValue::Float(v) => buf.extend_from_slice(&v.to_le_bytes()),
                FieldValue::Integer(v) => buf.extend_from_slice(&v.to_le_bytes()),
                FieldValue::Boolean(v) => buf.push(*v as u8),
                FieldValue::String(v) => {
                    buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    buf.extend_from_slice(v.as_bytes());
                }
            }
        }

        buf.extend_from_slice(&row.timestamp.to_le_bytes());
    }

    buf
}

/// Decodes a row batch from an uncompressed WAL body.
///
/// # Errors
///
/// Returns `ExportError::CorruptWalRecord` if any declared length runs past
/// the end of the buffer or an embedded string is not valid UTF-8.
pub fn unmarshal_rows(buf: &[u8]) -> Result<Vec<Row>> {
    let mut cursor = BodyCursor { buf, pos: 0 };

    let row_count = cursor.read_u32()?;
    let mut rows = Vec::with_capacity(row_count as usize);

    for _ in 0..row_count {
        let name = cursor.read_string16()?;

        let tag_count = cursor.read_u16()?;
        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            let key = cursor.read_string16()?;
            let value = cursor.read_string16()?;
            tags.push(Tag { key, value });
        }

        let field_count = cursor.read_u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let key = cursor.read_string16()?;
            let typ = FieldType::from_u8(cursor.read_u8()?).ok_or_else(|| {
                ExportError::CorruptWalRecord("unknown field type".to_string())
            })?;
            let value = match typ {
                FieldType::Float => FieldValue::Float(f64::from_le_bytes(cursor.read_array()?)),
                FieldType::Integer => {
                    FieldValue::Integer(i64::from_le_bytes(cursor.read_array()?))
                }
                FieldType::Boolean => FieldValue::Boolean(cursor.read_u8()? != 0),
                FieldType::String => FieldValue::String(cursor.read_string32()?),
            };
            fields.push(Field { key, value });
        }

        let timestamp = i64::from_le_bytes(cursor.read_array()?);
        rows.push(Row {
            name,
            tags,
            fields,
            timestamp,
        });
    }

    Ok(rows)
}

/// Writes one WAL frame (header + Snappy-compressed body) for a row batch.
pub fn write_frame<W: std::io::Write>(writer: &mut W, rows: &[Row]) -> Result<()> {
    let body = marshal_rows(rows);
    let compressed = snap::raw::Encoder::new()
        .compress_vec(&body)
        .map_err(|e| ExportError::CorruptWalRecord(e.to_string()))?;

    writer.write_all(&[WAL_RECORD_TYPE_ROWS])?;
    writer.write_all(&(compressed.len() as u32).to_be_bytes())?;
    writer.write_all(&compressed)?;
    Ok(())
}

/// Streaming reader over the rows of one WAL file.
///
/// Yields decoded rows until the file ends or the first damaged frame, which
/// is logged and treated as end-of-file. The compressed-frame scratch buffer
/// is reused across frames, resized to each frame's declared length.
pub struct WalReader {
    path: PathBuf,
    file: File,
    offset: u64,
    file_size: u64,
    comp_buf: Vec<u8>,
    batch: Vec<Row>,
    batch_pos: usize,
    done: bool,
}

impl WalReader {
    /// Opens a WAL file for reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            offset: 0,
            file_size,
            comp_buf: Vec::new(),
            batch: Vec::new(),
            batch_pos: 0,
            done: file_size == 0,
        })
    }

    /// Reads and decodes the next frame, or returns `None` at end-of-file or
    /// on the first damaged frame (which ends the file).
    fn read_batch(&mut self) -> Option<Vec<Row>> {
        if self.offset >= self.file_size {
            return None;
        }

        // Frame header: 1 type byte + 4-byte big-endian body length
        let mut header = [0u8; WAL_RECORD_HEADER_SIZE];
        if let Err(e) = self.file.read_exact(&mut header) {
            warn!(
                "ReadWalFileFailed: {} offset {}: record header: {}",
                self.path.display(),
                self.offset,
                e
            );
            return None;
        }
        self.offset += WAL_RECORD_HEADER_SIZE as u64;

        let comp_len = u32::from_be_bytes(header[1..5].try_into().unwrap()) as usize;
        self.comp_buf.resize(comp_len, 0);
        if let Err(e) = self.file.read_exact(&mut self.comp_buf) {
            warn!(
                "ReadWalFileFailed: {} offset {}: record body: {}",
                self.path.display(),
                self.offset,
                e
            );
            return None;
        }
        self.offset += comp_len as u64;

        let body = match snap::raw::Decoder::new().decompress_vec(&self.comp_buf) {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    "DecompressWalRecordFailed: {} offset {}: {}",
                    self.path.display(),
                    self.offset,
                    e
                );
                return None;
            }
        };

        match unmarshal_rows(&body) {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(
                    "UnmarshalWalRecordFailed: {} offset {}: {}",
                    self.path.display(),
                    self.offset,
                    e
                );
                None
            }
        }
    }
}

impl Iterator for WalReader {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.batch_pos < self.batch.len() {
                let row = self.batch[self.batch_pos].clone();
                self.batch_pos += 1;
                return Some(row);
            }
            if self.done {
                return None;
            }
            match self.read_batch() {
                Some(rows) => {
                    self.batch = rows;
                    self.batch_pos = 0;
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// Bounds-checked slice reader for WAL body decoding.
struct BodyCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyCursor<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ExportError::CorruptWalRecord(format!(
                "row batch truncated: need {} bytes, {} available",
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        Ok(self.take(N)?.try_into().unwrap())
    }

    fn read_string16(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        self.read_string(len)
    }

    fn read_string32(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        self.read_string(len)
    }

    fn read_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            ExportError::CorruptWalRecord(format!("invalid UTF-8 in row batch: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_rows() -> Vec<Row> {
        vec![
            Row {
                name: "weather_0000".to_string(),
                tags: vec![Tag::new("city", "sh")],
                fields: vec![
                    Field::new("temperature", FieldValue::Float(21.5)),
                    Field::new("humidity", FieldValue::Integer(60)),
                    Field::new("raining", FieldValue::Boolean(false)),
                    Field::new("note", FieldValue::String("clear".to_string())),
                ],
                timestamp: 1_000_000_000,
            },
            Row {
                name: "weather_0000".to_string(),
                tags: vec![Tag::new("city", "bj")],
                fields: vec![Field::new("temperature", FieldValue::Float(18.0))],
                timestamp: 2_000_000_000,
            },
        ]
    }

    #[test]
    fn test_rows_roundtrip() {
        let rows = sample_rows();
        let body = marshal_rows(&rows);
        let decoded = unmarshal_rows(&body).unwrap();
        assert_eq!(rows, decoded);
    }

    #[test]
    fn test_unmarshal_truncated_body() {
        let body = marshal_rows(&sample_rows());
        for cut in 1..body.len() {
            // Every strict prefix must error, never panic.
            assert!(unmarshal_rows(&body[..cut]).is_err());
        }
    }

    #[test]
    fn test_reader_multiple_frames() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("1.wal");

        {
            let mut file = File::create(&path).unwrap();
            write_frame(&mut file, &sample_rows()).unwrap();
            write_frame(&mut file, &sample_rows()[..1]).unwrap();
            file.flush().unwrap();
        }

        let rows: Vec<Row> = WalReader::open(&path).unwrap().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].tags[0].value, "sh");
    }

    #[test]
    fn test_reader_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.wal");
        File::create(&path).unwrap();

        let rows: Vec<Row> = WalReader::open(&path).unwrap().collect();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_reader_truncated_last_frame() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("truncated.wal");

        {
            let mut file = File::create(&path).unwrap();
            write_frame(&mut file, &sample_rows()).unwrap();
            write_frame(&mut file, &sample_rows()).unwrap();
            file.flush().unwrap();
        }

        // Cut into the middle of the second frame's body.
        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 7]).unwrap();

        let rows: Vec<Row> = WalReader::open(&path).unwrap().collect();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_reader_corrupt_snappy_body() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.wal");

        {
            let mut file = File::create(&path).unwrap();
            write_frame(&mut file, &sample_rows()).unwrap();
            // A frame whose body is not valid Snappy: the literal runs past
            // the end of the stream. A later intact frame must not be
            // resurrected; the first damaged frame ends the file.
            file.write_all(&[WAL_RECORD_TYPE_ROWS]).unwrap();
            file.write_all(&2u32.to_be_bytes()).unwrap();
            file.write_all(&[0x01, 0xF0]).unwrap();
            write_frame(&mut file, &sample_rows()).unwrap();
            file.flush().unwrap();
        }

        let rows: Vec<Row> = WalReader::open(&path).unwrap().collect();
        assert_eq!(rows.len(), 2);
    }
}

//! TSSP file format implementation.
//!
//! This module reads and writes `.tssp` segment files. The format:
//!
//! - Header with magic bytes, version, time bounds, and chunk count
//! - Sequential chunk blocks, each covering one series, with a per-chunk CRC
//! - Footer with the total row count, a whole-file CRC, and reverse magic
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  File Header (32 bytes)                                      │
//! │  - Magic: "TSSP" (4 bytes)                                   │
//! │  - Version: u16 (2 bytes) = 1                                │
//! │  - Min Timestamp: i64 (8 bytes)                              │
//! │  - Max Timestamp: i64 (8 bytes)                              │
//! │  - Chunk Count: u32 (4 bytes)                                │
//! │  - Reserved: 6 bytes                                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Chunk Blocks (repeated per series)                          │
//! │  - Series id, schema, column values, times, chunk CRC        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Footer (24 bytes)                                           │
//! │  - Total row count, file CRC, reverse magic, reserved        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Chunk Block Layout
//!
//! ```text
//! Offset  Size    Field
//! ------  ----    -----
//! 0x00    8       series_id (u64 LE)
//! 0x08    4       row_count (u32 LE)
//! 0x0C    8       min_timestamp (i64 LE)
//! 0x14    8       max_timestamp (i64 LE)
//! 0x1C    2       field_count (u16 LE, includes trailing "time")
//!         ...     fields: name_len (u16 LE) + name + type (u8)
//!         ...     column values per non-time field
//!                   Float/Integer: 8 B per row; Boolean: 1 B per row;
//!                   String: u32 LE length + bytes per row
//!         ...     times: i64 LE × row_count
//!         4       chunk_crc32 (u32 LE, covers series_id through times)
//! ```

use crate::error::{ExportError, Result};
use crate::record::{ColumnValues, FieldSchema, FieldType};
use crate::tssp::Chunk;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the TSSP file header: "TSSP"
pub const TSSP_MAGIC: [u8; 4] = *b"TSSP";

/// Reverse magic bytes for the TSSP file footer: "PSST"
pub const TSSP_MAGIC_REVERSE: [u8; 4] = *b"PSST";

/// Current TSSP file format version.
pub const TSSP_VERSION: u16 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 32;

/// Footer size in bytes.
pub const FOOTER_SIZE: usize = 24;

/// TSSP file header (32 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsspHeader {
    /// File format version (currently 1).
    pub version: u16,
    /// Minimum timestamp in the file.
    pub min_timestamp: i64,
    /// Maximum timestamp in the file.
    pub max_timestamp: i64,
    /// Number of chunk blocks in the file.
    pub chunk_count: u32,
}

impl Default for TsspHeader {
    fn default() -> Self {
        Self {
            version: TSSP_VERSION,
            min_timestamp: i64::MAX,
            max_timestamp: i64::MIN,
            chunk_count: 0,
        }
    }
}

impl TsspHeader {
    /// Writes the header to a writer using little-endian byte order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Magic (4 bytes)
        writer.write_all(&TSSP_MAGIC)?;
        // Version (2 bytes)
        writer.write_all(&self.version.to_le_bytes())?;
        // Min timestamp (8 bytes)
        writer.write_all(&self.min_timestamp.to_le_bytes())?;
        // Max timestamp (8 bytes)
        writer.write_all(&self.max_timestamp.to_le_bytes())?;
        // Chunk count (4 bytes)
        writer.write_all(&self.chunk_count.to_le_bytes())?;
        // Reserved (6 bytes)
        writer.write_all(&[0u8; 6])?;

        Ok(())
    }

    /// Reads a header from a reader.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::InvalidMagic` if the magic bytes don't match and
    /// `ExportError::UnsupportedVersion` if the version is not supported.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf)?;

        let magic: [u8; 4] = buf[0..4].try_into().unwrap();
        if magic != TSSP_MAGIC {
            return Err(ExportError::InvalidMagic(magic));
        }

        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if version > TSSP_VERSION {
            return Err(ExportError::UnsupportedVersion(version));
        }

        let min_timestamp = i64::from_le_bytes(buf[6..14].try_into().unwrap());
        let max_timestamp = i64::from_le_bytes(buf[14..22].try_into().unwrap());
        let chunk_count = u32::from_le_bytes(buf[22..26].try_into().unwrap());

        Ok(Self {
            version,
            min_timestamp,
            max_timestamp,
            chunk_count,
        })
    }
}

/// TSSP file footer (24 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsspFooter {
    /// Total number of rows across all chunks.
    pub total_row_count: u64,
    /// CRC32 of the file content excluding the footer.
    pub file_crc32: u32,
}

impl TsspFooter {
    /// Writes the footer to a writer using little-endian byte order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Total row count (8 bytes)
        writer.write_all(&self.total_row_count.to_le_bytes())?;
        // File CRC32 (4 bytes)
        writer.write_all(&self.file_crc32.to_le_bytes())?;
        // Magic reverse (4 bytes)
        writer.write_all(&TSSP_MAGIC_REVERSE)?;
        // Reserved (8 bytes)
        writer.write_all(&[0u8; 8])?;

        Ok(())
    }

    /// Reads a footer from a reader.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::InvalidMagic` if the reverse magic doesn't match.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; FOOTER_SIZE];
        reader.read_exact(&mut buf)?;

        let total_row_count = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let file_crc32 = u32::from_le_bytes(buf[8..12].try_into().unwrap());

        let magic_reverse: [u8; 4] = buf[12..16].try_into().unwrap();
        if magic_reverse != TSSP_MAGIC_REVERSE {
            return Err(ExportError::InvalidMagic(magic_reverse));
        }

        Ok(Self {
            total_row_count,
            file_crc32,
        })
    }
}

fn write_chunk_body<W: Write>(chunk: &Chunk, writer: &mut W) -> Result<()> {
    let mut body = Vec::new();
    encode_chunk_body(chunk, &mut body);
    let crc = crc32fast::hash(&body);
    writer.write_all(&body)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

fn encode_chunk_body(chunk: &Chunk, body: &mut Vec<u8>) {
    // Series id (8 bytes)
    body.extend_from_slice(&chunk.series_id.to_le_bytes());
    // Row count (4 bytes)
    body.extend_from_slice(&(chunk.times.len() as u32).to_le_bytes());
    // Min timestamp (8 bytes)
    body.extend_from_slice(&chunk.min_ts.to_le_bytes());
    // Max timestamp (8 bytes)
    body.extend_from_slice(&chunk.max_ts.to_le_bytes());
    // Field count (2 bytes)
    body.extend_from_slice(&(chunk.schema.len() as u16).to_le_bytes());
    // Fields (name + type)
    for field in &chunk.schema {
        body.extend_from_slice(&(field.name.len() as u16).to_le_bytes());
        body.extend_from_slice(field.name.as_bytes());
        body.push(field.typ as u8);
    }
    // Column values
    for column in &chunk.columns {
        match column {
            ColumnValues::Float(values) => {
                for v in values {
                    body.extend_from_slice(&v.to_le_bytes());
                }
            }
            ColumnValues::Integer(values) => {
                for v in values {
                    body.extend_from_slice(&v.to_le_bytes());
                }
            }
            ColumnValues::Boolean(values) => {
                for v in values {
                    body.push(*v as u8);
                }
            }
            ColumnValues::String(values) => {
                for v in values {
                    body.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    body.extend_from_slice(v.as_bytes());
                }
            }
        }
    }
    // Times
    for ts in &chunk.times {
        body.extend_from_slice(&ts.to_le_bytes());
    }
}

fn read_chunk<R: Read>(reader: &mut R) -> Result<Chunk> {
    let mut hasher = crc32fast::Hasher::new();

    // Series id (8 bytes)
    let mut buf8 = [0u8; 8];
    reader.read_exact(&mut buf8)?;
    hasher.update(&buf8);
    let series_id = u64::from_le_bytes(buf8);

    // Row count (4 bytes)
    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4)?;
    hasher.update(&buf4);
    let row_count = u32::from_le_bytes(buf4) as usize;

    // Min timestamp (8 bytes)
    reader.read_exact(&mut buf8)?;
    hasher.update(&buf8);
    let min_ts = i64::from_le_bytes(buf8);

    // Max timestamp (8 bytes)
    reader.read_exact(&mut buf8)?;
    hasher.update(&buf8);
    let max_ts = i64::from_le_bytes(buf8);

    // Field count (2 bytes)
    let mut buf2 = [0u8; 2];
    reader.read_exact(&mut buf2)?;
    hasher.update(&buf2);
    let field_count = u16::from_le_bytes(buf2) as usize;

    // Fields
    let mut schema = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        reader.read_exact(&mut buf2)?;
        hasher.update(&buf2);
        let name_len = u16::from_le_bytes(buf2) as usize;

        let mut name_bytes = vec![0u8; name_len];
        reader.read_exact(&mut name_bytes)?;
        hasher.update(&name_bytes);
        let name = String::from_utf8(name_bytes).map_err(|e| {
            ExportError::CorruptSegment(format!("invalid UTF-8 in field name: {}", e))
        })?;

        let mut buf1 = [0u8; 1];
        reader.read_exact(&mut buf1)?;
        hasher.update(&buf1);
        let typ = FieldType::from_u8(buf1[0]).ok_or_else(|| {
            ExportError::CorruptSegment(format!("unknown field type {}", buf1[0]))
        })?;

        schema.push(FieldSchema::new(name, typ));
    }

    // Column values (one column per non-time field)
    let value_fields = field_count.saturating_sub(1);
    let mut columns = Vec::with_capacity(value_fields);
    for field in schema.iter().take(value_fields) {
        let column = match field.typ {
            FieldType::Float => {
                let mut values = Vec::with_capacity(row_count);
                for _ in 0..row_count {
                    reader.read_exact(&mut buf8)?;
                    hasher.update(&buf8);
                    values.push(f64::from_le_bytes(buf8));
                }
                ColumnValues::Float(values)
            }
            FieldType::Integer => {
                let mut values = Vec::with_capacity(row_count);
                for _ in 0..row_count {
                    reader.read_exact(&mut buf8)?;
                    hasher.update(&buf8);
                    values.push(i64::from_le_bytes(buf8));
                }
                ColumnValues::Integer(values)
            }
            FieldType::Boolean => {
                let mut values = Vec::with_capacity(row_count);
                let mut buf1 = [0u8; 1];
                for _ in 0..row_count {
                    reader.read_exact(&mut buf1)?;
                    hasher.update(&buf1);
                    values.push(buf1[0] != 0);
                }
                ColumnValues::Boolean(values)
            }
            FieldType::String => {
                let mut values = Vec::with_capacity(row_count);
                for _ in 0..row_count {
                    reader.read_exact(&mut buf4)?;
                    hasher.update(&buf4);
                    let len = u32::from_le_bytes(buf4) as usize;
                    let mut bytes = vec![0u8; len];
                    reader.read_exact(&mut bytes)?;
                    hasher.update(&bytes);
                    let value = String::from_utf8(bytes).map_err(|e| {
                        ExportError::CorruptSegment(format!(
                            "invalid UTF-8 in string column: {}",
                            e
                        ))
                    })?;
                    values.push(value);
                }
                ColumnValues::String(values)
            }
        };
        columns.push(column);
    }

    // Times
    let mut times = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        reader.read_exact(&mut buf8)?;
        hasher.update(&buf8);
        times.push(i64::from_le_bytes(buf8));
    }

    // Chunk CRC32 (4 bytes)
    reader.read_exact(&mut buf4)?;
    let expected_crc = u32::from_le_bytes(buf4);
    let actual_crc = hasher.finalize();
    if expected_crc != actual_crc {
        return Err(ExportError::ChecksumMismatch {
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    let chunk = Chunk::new(series_id, schema, columns, times)?;
    if chunk.min_ts != min_ts || chunk.max_ts != max_ts {
        return Err(ExportError::CorruptSegment(
            "chunk time bounds do not match stored values".to_string(),
        ));
    }
    Ok(chunk)
}

/// TSSP file writer.
///
/// Writer counterpart to [`TsspReader`], used by the test suite and fixture
/// tooling. Writes a placeholder header, appends chunk blocks, then rewrites
/// the header and appends the footer on [`TsspWriter::finish`].
pub struct TsspWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    min_timestamp: i64,
    max_timestamp: i64,
    chunk_count: u32,
    total_row_count: u64,
}

impl TsspWriter {
    /// Creates a new TSSP writer for the given path.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // Placeholder header, rewritten in finish()
        TsspHeader::default().write_to(&mut writer)?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            min_timestamp: i64::MAX,
            max_timestamp: i64::MIN,
            chunk_count: 0,
            total_row_count: 0,
        })
    }

    /// Appends a chunk block to the file.
    pub fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        write_chunk_body(chunk, &mut self.writer)?;
        self.min_timestamp = self.min_timestamp.min(chunk.min_ts);
        self.max_timestamp = self.max_timestamp.max(chunk.max_ts);
        self.chunk_count += 1;
        self.total_row_count += chunk.times.len() as u64;
        Ok(())
    }

    /// Finishes the file: rewrites the header, computes the file CRC, and
    /// appends the footer.
    pub fn finish(mut self) -> Result<()> {
        let header = TsspHeader {
            version: TSSP_VERSION,
            min_timestamp: self.min_timestamp,
            max_timestamp: self.max_timestamp,
            chunk_count: self.chunk_count,
        };

        self.writer.seek(SeekFrom::Start(0))?;
        header.write_to(&mut self.writer)?;
        self.writer.flush()?;

        // File CRC over everything written so far
        let file_crc32 = {
            let mut file = File::open(&self.path)?;
            let mut hasher = crc32fast::Hasher::new();
            let mut buffer = [0u8; 8192];
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            hasher.finalize()
        };

        self.writer.seek(SeekFrom::End(0))?;
        let footer = TsspFooter {
            total_row_count: self.total_row_count,
            file_crc32,
        };
        footer.write_to(&mut self.writer)?;

        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;

        Ok(())
    }
}

/// TSSP file reader.
///
/// Opens a segment file, validates header, footer, and whole-file CRC, and
/// streams chunk blocks via [`TsspReader::chunks`].
pub struct TsspReader {
    path: PathBuf,
    header: TsspHeader,
    footer: TsspFooter,
}

impl TsspReader {
    /// Opens a TSSP file for reading and verifies its integrity.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = TsspHeader::read_from(&mut reader)?;

        reader.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let footer = TsspFooter::read_from(&mut reader)?;

        let calculated_crc = calculate_file_crc(path, file_size - FOOTER_SIZE as u64)?;
        if calculated_crc != footer.file_crc32 {
            return Err(ExportError::ChecksumMismatch {
                expected: footer.file_crc32,
                actual: calculated_crc,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            header,
            footer,
        })
    }

    /// Returns the file header.
    pub fn header(&self) -> &TsspHeader {
        &self.header
    }

    /// Returns the file footer.
    pub fn footer(&self) -> &TsspFooter {
        &self.footer
    }

    /// Returns a streaming iterator over the file's chunk blocks.
    pub fn chunks(&self) -> Result<ChunkIterator> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        Ok(ChunkIterator {
            reader,
            remaining: self.header.chunk_count,
        })
    }
}

/// Streaming iterator over the chunk blocks of one TSSP file.
///
/// Decodes one chunk at a time; chunk memory is released when the caller
/// drops the yielded value.
pub struct ChunkIterator {
    reader: BufReader<File>,
    remaining: u32,
}

impl Iterator for ChunkIterator {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(read_chunk(&mut self.reader))
    }
}

fn calculate_file_crc(path: &Path, size: u64) -> Result<u32> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = [0u8; 8192];
    let mut remaining = size;

    while remaining > 0 {
        let to_read = remaining.min(buffer.len() as u64) as usize;
        let n = file.read(&mut buffer[..to_read])?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        remaining -= n as u64;
    }

    Ok(hasher.finalize())
}

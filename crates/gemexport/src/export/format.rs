//! Line-protocol and CSV row formatting.
//!
//! Both output formats implement the same capability set behind
//! [`LineFormat`]: decoding an encoded series key into a row prefix,
//! appending the field portion of a row, and emitting the one-time
//! per-measurement header. The format is chosen once at init via
//! [`line_format`]; the hot loop dispatches through the returned object.
//!
//! Field encodings: floats print as shortest round-trip decimals, integers
//! carry a trailing `i`, booleans print `true`/`false`, strings are quoted
//! with `"` and `\` escaped. The column named `time` is never emitted as a
//! field; it becomes the row's trailing timestamp.

use crate::error::{ExportError, Result};
use crate::record::{strip_version_suffix, ColumnValues, FieldSchema, FieldValue, Row, TIME_COLUMN};
use crate::series::decode_series_key;
use crate::tssp::Chunk;
use std::io::Write;

/// Name of the line-protocol text format.
pub const TXT_FORMAT: &str = "txt";

/// Name of the CSV format.
pub const CSV_FORMAT: &str = "csv";

/// Capability set shared by the output formats.
pub trait LineFormat {
    /// Decodes an encoded series key and appends the format's row prefix
    /// (`mst,tagK=tagV,...` for txt, `tagV1,tagV2,...` for csv) to `dst`,
    /// without a trailing separator.
    fn append_series_prefix(&self, key: &[u8], dst: &mut Vec<u8>) -> Result<()>;

    /// Appends the field portion and trailing timestamp of one chunk row,
    /// including the separator that follows the series prefix and the
    /// terminating newline.
    fn append_record_fields(&self, chunk: &Chunk, row: usize, dst: &mut Vec<u8>);

    /// Appends one full output line for a WAL row. `measurement` is the
    /// version-stripped measurement name.
    fn append_wal_row(&self, measurement: &str, row: &Row, dst: &mut Vec<u8>);

    /// Writes the one-time measurement header: the `# CONTEXT-TAGS:` comment
    /// and, for csv, the column header row.
    fn write_measurement_header(
        &self,
        out: &mut dyn Write,
        key: &[u8],
        schema: &[FieldSchema],
    ) -> Result<()>;
}

/// Selects the output format implementation by name.
///
/// # Errors
///
/// Returns `ExportError::UnsupportedFormat` for anything but `txt` or `csv`.
pub fn line_format(name: &str) -> Result<Box<dyn LineFormat>> {
    match name {
        TXT_FORMAT => Ok(Box::new(TxtFormat)),
        CSV_FORMAT => Ok(Box::new(CsvFormat)),
        other => Err(ExportError::UnsupportedFormat(other.to_string())),
    }
}

/// Line-protocol text format.
pub struct TxtFormat;

/// CSV format.
pub struct CsvFormat;

impl LineFormat for TxtFormat {
    fn append_series_prefix(&self, key: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        let series = decode_series_key(key)?;
        let measurement = strip_version_suffix(&series.measurement);
        append_escaped(dst, measurement, is_measurement_special);
        for tag in &series.tags {
            dst.push(b',');
            append_escaped(dst, &tag.key, is_tag_special);
            dst.push(b'=');
            append_escaped(dst, &tag.value, is_tag_special);
        }
        Ok(())
    }

    fn append_record_fields(&self, chunk: &Chunk, row: usize, dst: &mut Vec<u8>) {
        dst.push(b' ');
        let mut first = true;
        for (field, column) in chunk.schema.iter().zip(chunk.columns.iter()) {
            if field.name == TIME_COLUMN {
                continue;
            }
            if !first {
                dst.push(b',');
            }
            first = false;
            append_escaped(dst, &field.name, is_tag_special);
            dst.push(b'=');
            append_column_value(column, row, dst);
        }
        dst.push(b' ');
        dst.extend_from_slice(chunk.times[row].to_string().as_bytes());
        dst.push(b'\n');
    }

    fn append_wal_row(&self, measurement: &str, row: &Row, dst: &mut Vec<u8>) {
        append_escaped(dst, measurement, is_measurement_special);
        for tag in &row.tags {
            dst.push(b',');
            append_escaped(dst, &tag.key, is_tag_special);
            dst.push(b'=');
            append_escaped(dst, &tag.value, is_tag_special);
        }
        dst.push(b' ');
        for (i, field) in row.fields.iter().enumerate() {
            if i > 0 {
                dst.push(b',');
            }
            append_escaped(dst, &field.key, is_tag_special);
            dst.push(b'=');
            append_field_value(&field.value, dst);
        }
        dst.push(b' ');
        dst.extend_from_slice(row.timestamp.to_string().as_bytes());
        dst.push(b'\n');
    }

    fn write_measurement_header(
        &self,
        out: &mut dyn Write,
        key: &[u8],
        _schema: &[FieldSchema],
    ) -> Result<()> {
        let series = decode_series_key(key)?;
        writeln!(out, "# CONTEXT-TAGS: {}", tag_key_list(&series.tags))?;
        Ok(())
    }
}

impl LineFormat for CsvFormat {
    fn append_series_prefix(&self, key: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        let series = decode_series_key(key)?;
        for (i, tag) in series.tags.iter().enumerate() {
            if i > 0 {
                dst.push(b',');
            }
            append_escaped(dst, &tag.value, is_tag_special);
        }
        Ok(())
    }

    fn append_record_fields(&self, chunk: &Chunk, row: usize, dst: &mut Vec<u8>) {
        for (field, column) in chunk.schema.iter().zip(chunk.columns.iter()) {
            if field.name == TIME_COLUMN {
                continue;
            }
            dst.push(b',');
            append_column_value(column, row, dst);
        }
        dst.push(b',');
        dst.extend_from_slice(chunk.times[row].to_string().as_bytes());
        dst.push(b'\n');
    }

    fn append_wal_row(&self, _measurement: &str, row: &Row, dst: &mut Vec<u8>) {
        for (i, tag) in row.tags.iter().enumerate() {
            if i > 0 {
                dst.push(b',');
            }
            append_escaped(dst, &tag.value, is_tag_special);
        }
        for field in &row.fields {
            dst.push(b',');
            append_field_value(&field.value, dst);
        }
        dst.push(b',');
        dst.extend_from_slice(row.timestamp.to_string().as_bytes());
        dst.push(b'\n');
    }

    fn write_measurement_header(
        &self,
        out: &mut dyn Write,
        key: &[u8],
        schema: &[FieldSchema],
    ) -> Result<()> {
        let series = decode_series_key(key)?;
        writeln!(out, "# CONTEXT-TAGS: {}", tag_key_list(&series.tags))?;

        // Column header row: tag keys, then every schema column incl. time.
        let mut header = tag_key_list(&series.tags);
        for field in schema {
            if !header.is_empty() {
                header.push(',');
            }
            header.push_str(&field.name);
        }
        writeln!(out, "{}", header)?;
        Ok(())
    }
}

fn tag_key_list(tags: &[crate::record::Tag]) -> String {
    let mut list = String::new();
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            list.push(',');
        }
        list.push_str(&escape_tag(&tag.key));
    }
    list
}

fn append_column_value(column: &ColumnValues, row: usize, dst: &mut Vec<u8>) {
    match column {
        ColumnValues::Float(values) => {
            dst.extend_from_slice(values[row].to_string().as_bytes());
        }
        ColumnValues::Integer(values) => {
            dst.extend_from_slice(values[row].to_string().as_bytes());
            dst.push(b'i');
        }
        ColumnValues::Boolean(values) => {
            dst.extend_from_slice(if values[row] { &b"true"[..] } else { &b"false"[..] });
        }
        ColumnValues::String(values) => {
            dst.push(b'"');
            append_escaped(dst, &values[row], is_string_field_special);
            dst.push(b'"');
        }
    }
}

fn append_field_value(value: &FieldValue, dst: &mut Vec<u8>) {
    match value {
        FieldValue::Float(v) => dst.extend_from_slice(v.to_string().as_bytes()),
        FieldValue::Integer(v) => {
            dst.extend_from_slice(v.to_string().as_bytes());
            dst.push(b'i');
        }
        FieldValue::Boolean(v) => {
            dst.extend_from_slice(if *v { &b"true"[..] } else { &b"false"[..] });
        }
        FieldValue::String(v) => {
            dst.push(b'"');
            append_escaped(dst, v, is_string_field_special);
            dst.push(b'"');
        }
    }
}

fn is_measurement_special(b: u8) -> bool {
    b == b'=' || b == b' '
}

fn is_tag_special(b: u8) -> bool {
    b == b',' || b == b'=' || b == b' '
}

fn is_string_field_special(b: u8) -> bool {
    b == b'"' || b == b'\\'
}

fn append_escaped(dst: &mut Vec<u8>, s: &str, is_special: fn(u8) -> bool) {
    for &b in s.as_bytes() {
        if is_special(b) {
            dst.push(b'\\');
        }
        dst.push(b);
    }
}

/// Escapes `=` and space in a measurement name.
pub fn escape_measurement(s: &str) -> String {
    escape_with(s, is_measurement_special)
}

/// Escapes `,`, `=`, and space in a tag key, tag value, or field key.
pub fn escape_tag(s: &str) -> String {
    escape_with(s, is_tag_special)
}

/// Escapes `"` and `\` in a string field value.
pub fn escape_string_field(s: &str) -> String {
    escape_with(s, is_string_field_special)
}

fn escape_with(s: &str, is_special: fn(u8) -> bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii() && is_special(c as u8) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

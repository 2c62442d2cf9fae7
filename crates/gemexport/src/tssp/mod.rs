//! TSSP segment file access.
//!
//! A `.tssp` file is an immutable columnar batch of rows for a single
//! measurement. [`file`] implements the on-disk format and the streaming
//! chunk reader; [`shard`] parses the surrounding storage-path components
//! (shard and index directory names, in-order vs out-of-order placement).

pub mod file;
pub mod shard;

pub use file::{ChunkIterator, TsspFooter, TsspHeader, TsspReader, TsspWriter};
pub use shard::{locate_shard_dir, parse_index_dir, parse_shard_dir};

use crate::error::{ExportError, Result};
use crate::record::{ColumnValues, FieldSchema, TIME_COLUMN};

/// A batch of rows for one series, as stored in a segment file.
///
/// The schema's last column is always [`TIME_COLUMN`]; `columns` holds one
/// value column per non-time field, parallel to `schema[..len - 1]`, and
/// `times` holds the timestamp column.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Series id owning the rows. Never 0 in a valid file.
    pub series_id: u64,
    /// Field schema, including the trailing time column.
    pub schema: Vec<FieldSchema>,
    /// Value columns, one per non-time schema entry.
    pub columns: Vec<ColumnValues>,
    /// Timestamps in nanoseconds, in storage order.
    pub times: Vec<i64>,
    /// Minimum timestamp in the chunk.
    pub min_ts: i64,
    /// Maximum timestamp in the chunk.
    pub max_ts: i64,
}

impl Chunk {
    /// Creates a chunk, validating its shape and computing the time bounds.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::CorruptSegment` if the schema does not end in
    /// the time column, the column count or lengths do not line up, or a
    /// column's type differs from its schema entry.
    pub fn new(
        series_id: u64,
        schema: Vec<FieldSchema>,
        columns: Vec<ColumnValues>,
        times: Vec<i64>,
    ) -> Result<Self> {
        validate_shape(&schema, &columns, &times)?;
        let min_ts = times.iter().copied().min().unwrap_or(i64::MAX);
        let max_ts = times.iter().copied().max().unwrap_or(i64::MIN);
        Ok(Self {
            series_id,
            schema,
            columns,
            times,
            min_ts,
            max_ts,
        })
    }

    /// Number of rows in the chunk.
    pub fn row_count(&self) -> usize {
        self.times.len()
    }
}

fn validate_shape(
    schema: &[FieldSchema],
    columns: &[ColumnValues],
    times: &[i64],
) -> Result<()> {
    match schema.last() {
        Some(last) if last.name == TIME_COLUMN => {}
        _ => {
            return Err(ExportError::CorruptSegment(
                "chunk schema does not end in the time column".to_string(),
            ))
        }
    }
    if columns.len() != schema.len() - 1 {
        return Err(ExportError::CorruptSegment(format!(
            "chunk has {} value columns for {} fields",
            columns.len(),
            schema.len() - 1
        )));
    }
    if times.is_empty() {
        return Err(ExportError::CorruptSegment("chunk has no rows".to_string()));
    }
    for (field, column) in schema.iter().zip(columns.iter()) {
        if column.len() != times.len() {
            return Err(ExportError::CorruptSegment(format!(
                "column {:?} has {} rows, expected {}",
                field.name,
                column.len(),
                times.len()
            )));
        }
        if column.field_type() != field.typ {
            return Err(ExportError::CorruptSegment(format!(
                "column {:?} type does not match schema",
                field.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldType;

    fn schema() -> Vec<FieldSchema> {
        vec![
            FieldSchema::new("value", FieldType::Float),
            FieldSchema::new(TIME_COLUMN, FieldType::Integer),
        ]
    }

    #[test]
    fn test_chunk_new_computes_bounds() {
        let chunk = Chunk::new(
            7,
            schema(),
            vec![ColumnValues::Float(vec![1.0, 2.0, 3.0])],
            vec![30, 10, 20],
        )
        .unwrap();
        assert_eq!(chunk.min_ts, 10);
        assert_eq!(chunk.max_ts, 30);
        assert_eq!(chunk.row_count(), 3);
    }

    #[test]
    fn test_chunk_rejects_missing_time_column() {
        let result = Chunk::new(
            7,
            vec![FieldSchema::new("value", FieldType::Float)],
            vec![],
            vec![1],
        );
        assert!(matches!(result, Err(ExportError::CorruptSegment(_))));
    }

    #[test]
    fn test_chunk_rejects_ragged_columns() {
        let result = Chunk::new(
            7,
            schema(),
            vec![ColumnValues::Float(vec![1.0])],
            vec![1, 2],
        );
        assert!(matches!(result, Err(ExportError::CorruptSegment(_))));
    }

    #[test]
    fn test_chunk_rejects_type_mismatch() {
        let result = Chunk::new(
            7,
            schema(),
            vec![ColumnValues::Integer(vec![1, 2])],
            vec![1, 2],
        );
        assert!(matches!(result, Err(ExportError::CorruptSegment(_))));
    }
}

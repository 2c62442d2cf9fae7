//! Error and Result types for export operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// The error type for export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A required directory does not exist.
    #[error("Missing directory: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// A shard or index directory name does not match the expected shape.
    #[error("Invalid data dir: {0}")]
    InvalidDataDir(String),

    /// The retention-policy filter references a nonexistent retention.
    #[error("Retention policy {retention:?} invalid: {reason}")]
    InvalidRetention {
        /// The retention policy name from the filter.
        retention: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A retention-policy filter was combined with zero or multiple databases.
    #[error("retention policies can only be specified when specifying a single database")]
    AmbiguousFilter,

    /// The time filter is reversed or not parseable as RFC3339.
    #[error("Invalid time range {0:?}")]
    InvalidTimeRange(String),

    /// The export format is not one of `txt` or `csv`.
    #[error("Unsupported export format {0:?}")]
    UnsupportedFormat(String),

    /// Invalid magic bytes in a file header or footer.
    #[error("Invalid magic bytes: {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported on-disk format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// A checksum did not match the stored value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected CRC32 checksum.
        expected: u32,
        /// Actual computed CRC32 checksum.
        actual: u32,
    },

    /// A segment chunk violated a structural invariant.
    #[error("Corrupt segment: {0}")]
    CorruptSegment(String),

    /// An encoded series key could not be decoded.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// A WAL row batch could not be decoded.
    #[error("Corrupt WAL record: {0}")]
    CorruptWalRecord(String),

    /// A segment chunk carried the reserved series id 0.
    #[error("series ID is zero")]
    ZeroSeriesId,

    /// The index has no series keys for the requested series id.
    #[error("Series not found: {0}")]
    SeriesNotFound(u64),

    /// The export was cancelled between work units.
    #[error("export cancelled")]
    Cancelled,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

//! Gemexport - offline exporter for openGemini TSSP storage.
//!
//! Reconstructs the original ingestion stream from a local on-disk layout of
//! immutable columnar segment files (`.tssp`), WAL segments, and merge-set
//! series indexes, and writes it back out as a line-protocol (or CSV) dump
//! suitable for re-ingest or archival.
//!
//! # Components
//!
//! - [`export::Exporter`]: the driver, walking the storage tree and
//!   streaming every accepted row to the output sink
//! - [`tssp`]: segment file decoding and storage-path parsing
//! - [`index::MergeSetIndex`]: series-id → series-key resolution
//! - [`wal::WalReader`]: truncation-tolerant WAL frame decoding
//!
//! # Example
//!
//! ```rust,ignore
//! use gemexport::export::{ExportConfig, Exporter};
//!
//! let config = ExportConfig {
//!     format: "txt".to_string(),
//!     out: "dump.txt".to_string(),
//!     data_dir: "/tmp/openGemini/data".into(),
//!     wal_dir: "/tmp/openGemini/data".into(),
//!     ..Default::default()
//! };
//! let lines = Exporter::new(config)?.run()?;
//! println!("exported {lines} lines");
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod export;
pub mod index;
pub mod record;
pub mod series;
pub mod tssp;
pub mod wal;

pub use error::{ExportError, Result};
pub use export::{ExportConfig, Exporter};

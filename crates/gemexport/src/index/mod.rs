//! Merge-set series index access.
//!
//! An index directory (`<indexId>_<x>_<y>/` under a retention's `index/`
//! subdirectory) holds one or more part files with the `.msi` extension.
//! Parts are merged in name order when the index is opened; a part appearing
//! later may add further series keys for a series id already seen.
//!
//! ## Part File Layout
//!
//! ```text
//! Offset  Size    Field
//! ------  ----    -----
//! 0x00    4       magic "MSIP"
//! 0x04    2       version (u16 LE) = 1
//! 0x06    4       entry_count (u32 LE)
//!         ...     entries:
//!                   series_id (u64 LE)
//!                   key_count (u16 LE)
//!                   (key_len (u16 LE) + key bytes) × key_count
//! end-4   4       file_crc32 (u32 LE, covers magic through entries)
//! ```
//!
//! The exporter only resolves series ids to their encoded series keys; the
//! [`IndexBuilder`] writer counterpart exists for the test suite and fixture
//! tooling.

use crate::error::{ExportError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension of merge-set index part files.
pub const INDEX_PART_EXTENSION: &str = "msi";

/// Magic bytes of an index part file: "MSIP"
pub const INDEX_PART_MAGIC: [u8; 4] = *b"MSIP";

/// Current index part format version.
pub const INDEX_PART_VERSION: u16 = 1;

/// An opened merge-set index for one index directory.
///
/// Resolves a 64-bit series id to the encoded series keys registered for it.
/// The handle owns all part contents in memory; dropping it releases them.
#[derive(Debug)]
pub struct MergeSetIndex {
    path: PathBuf,
    series: BTreeMap<u64, Vec<Vec<u8>>>,
}

impl MergeSetIndex {
    /// Opens the index directory, merging all `.msi` parts in name order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or any part file is
    /// malformed.
    pub fn open(dir: &Path) -> Result<Self> {
        let mut parts = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(INDEX_PART_EXTENSION) {
                parts.push(path);
            }
        }
        parts.sort();

        let mut series: BTreeMap<u64, Vec<Vec<u8>>> = BTreeMap::new();
        for part in &parts {
            read_part(part, &mut series)?;
        }

        Ok(Self {
            path: dir.to_path_buf(),
            series,
        })
    }

    /// Resolves a series id to its encoded series keys.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::SeriesNotFound` if the id has no keys; a chunk
    /// referencing an unindexed series is a hard error, never silently
    /// dropped.
    pub fn resolve_series_keys(&self, series_id: u64) -> Result<&[Vec<u8>]> {
        match self.series.get(&series_id) {
            Some(keys) if !keys.is_empty() => Ok(keys),
            _ => Err(ExportError::SeriesNotFound(series_id)),
        }
    }

    /// Number of distinct series ids in the index.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Returns true if the index holds no series.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// The index directory this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_part(path: &Path, series: &mut BTreeMap<u64, Vec<Vec<u8>>>) -> Result<()> {
    let data = fs::read(path)?;
    if data.len() < 14 {
        return Err(ExportError::CorruptIndex(format!(
            "index part {} too small",
            path.display()
        )));
    }

    // CRC trailer covers everything before it.
    let body = &data[..data.len() - 4];
    let expected_crc = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap());
    let actual_crc = crc32fast::hash(body);
    if expected_crc != actual_crc {
        return Err(ExportError::ChecksumMismatch {
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    let magic: [u8; 4] = body[0..4].try_into().unwrap();
    if magic != INDEX_PART_MAGIC {
        return Err(ExportError::InvalidMagic(magic));
    }
    let version = u16::from_le_bytes(body[4..6].try_into().unwrap());
    if version > INDEX_PART_VERSION {
        return Err(ExportError::UnsupportedVersion(version));
    }
    let entry_count = u32::from_le_bytes(body[6..10].try_into().unwrap());

    let mut pos = 10usize;
    let underrun = || {
        ExportError::CorruptIndex(format!("index part {} truncated", path.display()))
    };
    for _ in 0..entry_count {
        if body.len() - pos < 10 {
            return Err(underrun());
        }
        let series_id = u64::from_le_bytes(body[pos..pos + 8].try_into().unwrap());
        let key_count = u16::from_le_bytes(body[pos + 8..pos + 10].try_into().unwrap());
        pos += 10;

        let keys = series.entry(series_id).or_default();
        for _ in 0..key_count {
            if body.len() - pos < 2 {
                return Err(underrun());
            }
            let key_len = u16::from_le_bytes(body[pos..pos + 2].try_into().unwrap()) as usize;
            pos += 2;
            if body.len() - pos < key_len {
                return Err(underrun());
            }
            keys.push(body[pos..pos + key_len].to_vec());
            pos += key_len;
        }
    }

    Ok(())
}

/// Builder for merge-set index part files.
///
/// Writer counterpart to [`MergeSetIndex`], used by the test suite and
/// fixture tooling.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    entries: BTreeMap<u64, Vec<Vec<u8>>>,
}

impl IndexBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an encoded series key for a series id.
    pub fn add_series(&mut self, series_id: u64, key: Vec<u8>) {
        self.entries.entry(series_id).or_default().push(key);
    }

    /// Writes a single part file containing all registered entries.
    pub fn write_part(&self, path: &Path) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&INDEX_PART_MAGIC);
        body.extend_from_slice(&INDEX_PART_VERSION.to_le_bytes());
        body.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());

        for (series_id, keys) in &self.entries {
            body.extend_from_slice(&series_id.to_le_bytes());
            body.extend_from_slice(&(keys.len() as u16).to_le_bytes());
            for key in keys {
                body.extend_from_slice(&(key.len() as u16).to_le_bytes());
                body.extend_from_slice(key);
            }
        }

        let crc = crc32fast::hash(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        fs::write(path, body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Tag;
    use crate::series::encode_series_key;
    use tempfile::TempDir;

    #[test]
    fn test_index_roundtrip() {
        let temp_dir = TempDir::new().unwrap();

        let mut builder = IndexBuilder::new();
        builder.add_series(1, encode_series_key("m_0000", &[Tag::new("host", "a")]));
        builder.add_series(2, encode_series_key("m_0000", &[Tag::new("host", "b")]));
        builder
            .write_part(&temp_dir.path().join("000001.msi"))
            .unwrap();

        let index = MergeSetIndex::open(temp_dir.path()).unwrap();
        assert_eq!(index.len(), 2);

        let keys = index.resolve_series_keys(1).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(
            keys[0],
            encode_series_key("m_0000", &[Tag::new("host", "a")])
        );
    }

    #[test]
    fn test_index_merges_parts() {
        let temp_dir = TempDir::new().unwrap();

        let mut first = IndexBuilder::new();
        first.add_series(1, encode_series_key("m_0000", &[Tag::new("host", "a")]));
        first.write_part(&temp_dir.path().join("000001.msi")).unwrap();

        let mut second = IndexBuilder::new();
        second.add_series(1, encode_series_key("m_0000", &[Tag::new("host", "b")]));
        second.add_series(3, encode_series_key("m_0000", &[Tag::new("host", "c")]));
        second.write_part(&temp_dir.path().join("000002.msi")).unwrap();

        let index = MergeSetIndex::open(temp_dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.resolve_series_keys(1).unwrap().len(), 2);
        assert_eq!(index.resolve_series_keys(3).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_series_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        IndexBuilder::new()
            .write_part(&temp_dir.path().join("000001.msi"))
            .unwrap();

        let index = MergeSetIndex::open(temp_dir.path()).unwrap();
        assert!(matches!(
            index.resolve_series_keys(99),
            Err(ExportError::SeriesNotFound(99))
        ));
    }

    #[test]
    fn test_corrupt_part_detected() {
        let temp_dir = TempDir::new().unwrap();
        let part = temp_dir.path().join("000001.msi");

        let mut builder = IndexBuilder::new();
        builder.add_series(1, encode_series_key("m_0000", &[Tag::new("host", "a")]));
        builder.write_part(&part).unwrap();

        let mut data = fs::read(&part).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0xFF;
        fs::write(&part, data).unwrap();

        assert!(matches!(
            MergeSetIndex::open(temp_dir.path()),
            Err(ExportError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_non_part_files_ignored() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("LOCK"), b"").unwrap();

        let mut builder = IndexBuilder::new();
        builder.add_series(1, encode_series_key("m_0000", &[]));
        builder
            .write_part(&temp_dir.path().join("000001.msi"))
            .unwrap();

        let index = MergeSetIndex::open(temp_dir.path()).unwrap();
        assert_eq!(index.len(), 1);
    }
}

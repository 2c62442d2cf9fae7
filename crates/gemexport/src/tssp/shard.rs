//! Storage-path parsing for segment files.
//!
//! Segment files live under a shard directory whose name encodes
//! `shardId_startNs_endNs_indexId`:
//!
//! ```text
//! <rp>/<shardId>_<startNs>_<endNs>_<indexId>/tssp/<mst>_<ver>/*.tssp              (in-order)
//! <rp>/<shardId>_<startNs>_<endNs>_<indexId>/tssp/<mst>_<ver>/out-of-order/*.tssp (out-of-order)
//! ```
//!
//! The index subdirectories of a retention are named `<indexId>_<x>_<y>`.

use crate::error::{ExportError, Result};
use crate::record::strip_version_suffix;
use std::path::Path;

/// File extension of segment files.
pub const TSSP_FILE_EXTENSION: &str = "tssp";

/// Directory name marking out-of-order segment files.
pub const OUT_OF_ORDER_DIR: &str = "out-of-order";

/// Separator in shard and index directory names.
const DIR_NAME_SEPARATOR: char = '_';

/// Parses a shard directory name `shardId_startNs_endNs_indexId` into
/// `(shard_id, index_id)`.
///
/// # Errors
///
/// Returns `ExportError::InvalidDataDir` if the name does not have exactly
/// four parts or the numeric parts do not parse.
pub fn parse_shard_dir(name: &str) -> Result<(u64, u64)> {
    let parts: Vec<&str> = name.split(DIR_NAME_SEPARATOR).collect();
    if parts.len() != 4 {
        return Err(ExportError::InvalidDataDir(name.to_string()));
    }
    let shard_id = parts[0]
        .parse::<u64>()
        .map_err(|_| ExportError::InvalidDataDir(name.to_string()))?;
    let index_id = parts[3]
        .parse::<u64>()
        .map_err(|_| ExportError::InvalidDataDir(name.to_string()))?;
    Ok((shard_id, index_id))
}

/// Parses an index directory name `<indexId>_<x>_<y>` into the index id.
///
/// # Errors
///
/// Returns `ExportError::InvalidDataDir` if the name does not have exactly
/// three parts or the index id does not parse.
pub fn parse_index_dir(name: &str) -> Result<u64> {
    let parts: Vec<&str> = name.split(DIR_NAME_SEPARATOR).collect();
    if parts.len() != 3 {
        return Err(ExportError::InvalidDataDir(name.to_string()));
    }
    parts[0]
        .parse::<u64>()
        .map_err(|_| ExportError::InvalidDataDir(name.to_string()))
}

/// Locates the shard directory name enclosing a segment file path and
/// reports whether the file is in time order.
///
/// Out-of-order files sit one level deeper, so the shard directory is the
/// 5th-from-last path component for them and the 4th-from-last otherwise.
pub fn locate_shard_dir(path: &Path) -> Result<(String, bool)> {
    let components: Vec<&str> = path
        .iter()
        .filter_map(|c| c.to_str())
        .collect();

    let is_order = !components.iter().any(|c| *c == OUT_OF_ORDER_DIR);
    let back = if is_order { 4 } else { 5 };
    if components.len() < back {
        return Err(ExportError::InvalidDataDir(path.display().to_string()));
    }
    Ok((components[components.len() - back].to_string(), is_order))
}

/// Returns the original measurement name for a segment file path.
///
/// The enclosing measurement directory is named `<mst>_<ver>`; for
/// out-of-order files it is one level further up.
pub fn measurement_of(path: &Path) -> Result<String> {
    let parent = path
        .parent()
        .ok_or_else(|| ExportError::InvalidDataDir(path.display().to_string()))?;
    let dir = if parent.file_name().and_then(|n| n.to_str()) == Some(OUT_OF_ORDER_DIR) {
        parent
            .parent()
            .ok_or_else(|| ExportError::InvalidDataDir(path.display().to_string()))?
    } else {
        parent
    };
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExportError::InvalidDataDir(path.display().to_string()))?;
    Ok(strip_version_suffix(name).to_string())
}

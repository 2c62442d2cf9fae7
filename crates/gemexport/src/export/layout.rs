//! On-disk layout resolution.
//!
//! Translates the user-supplied segment and WAL roots into per-database
//! directory maps. The storage tree is fixed:
//!
//! ```text
//! <segment-root>/data/<db>/<partition>/<retention>/        segment + index dirs
//! <wal-root>/wal/<db>/<partition>/<retention>/             WAL files
//! ```
//!
//! Every `(partition, retention)` pair is keyed as `"<pt>:<rp>"`. All
//! directory enumeration is sorted by name so downstream output is
//! deterministic.

use crate::error::{ExportError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Canonical subdirectory of the segment root.
pub const DATA_DIRECTORY: &str = "data";

/// Canonical subdirectory of the WAL root.
pub const WAL_DIRECTORY: &str = "wal";

/// Name of the index subdirectory below a retention's segment directory.
pub const INDEX_DIRECTORY: &str = "index";

/// Separator between partition and retention in a `ptRp` key.
const PT_RP_SEPARATOR: char = ':';

/// Builds a `"<pt>:<rp>"` key.
pub fn pt_rp_key(partition: &str, retention: &str) -> String {
    format!("{}{}{}", partition, PT_RP_SEPARATOR, retention)
}

/// Returns the retention half of a `"<pt>:<rp>"` key.
pub fn retention_of(pt_rp: &str) -> &str {
    pt_rp
        .split_once(PT_RP_SEPARATOR)
        .map(|(_, rp)| rp)
        .unwrap_or(pt_rp)
}

/// Resolved directory set for one database.
#[derive(Debug, Clone)]
pub struct DatabaseLayout {
    /// Database name.
    pub name: String,
    /// All resolved `"<pt>:<rp>"` keys.
    pub pt_rps: BTreeSet<String>,
    /// Segment directory per key.
    pub tssp_dirs: BTreeMap<String, PathBuf>,
    /// WAL directory per key.
    pub wal_dirs: BTreeMap<String, PathBuf>,
    /// Index directory per key (`<segment-dir>/index`).
    pub index_dirs: BTreeMap<String, PathBuf>,
}

impl DatabaseLayout {
    fn resolve(
        data_root: &Path,
        wal_root: &Path,
        database: &str,
        rp_filter: Option<&str>,
    ) -> Result<Self> {
        let data_dir = data_root.join(database);
        if !data_dir.is_dir() {
            return Err(ExportError::MissingDirectory(data_dir));
        }
        let wal_dir = wal_root.join(database);
        if !wal_dir.is_dir() {
            return Err(ExportError::MissingDirectory(wal_dir));
        }

        let mut layout = Self {
            name: database.to_string(),
            pt_rps: BTreeSet::new(),
            tssp_dirs: BTreeMap::new(),
            wal_dirs: BTreeMap::new(),
            index_dirs: BTreeMap::new(),
        };

        for partition in sorted_subdirs(&data_dir)? {
            let pt_data = data_dir.join(&partition);
            let pt_wal = wal_dir.join(&partition);

            if let Some(rp_filter) = rp_filter {
                for rp in rp_filter.split(',').filter(|rp| !rp.is_empty()) {
                    let key = pt_rp_key(&partition, rp);
                    let rp_data = pt_data.join(rp);
                    if !rp_data.is_dir() {
                        return Err(ExportError::InvalidRetention {
                            retention: rp.to_string(),
                            reason: format!("missing {}", rp_data.display()),
                        });
                    }
                    let rp_wal = pt_wal.join(rp);
                    if !rp_wal.is_dir() {
                        return Err(ExportError::InvalidRetention {
                            retention: rp.to_string(),
                            reason: format!("missing {}", rp_wal.display()),
                        });
                    }
                    layout.index_dirs.insert(key.clone(), rp_data.join(INDEX_DIRECTORY));
                    layout.tssp_dirs.insert(key.clone(), rp_data);
                    layout.wal_dirs.insert(key.clone(), rp_wal);
                    layout.pt_rps.insert(key);
                }
                continue;
            }

            for rp in sorted_subdirs(&pt_data)? {
                let key = pt_rp_key(&partition, &rp);
                let rp_data = pt_data.join(&rp);
                layout.index_dirs.insert(key.clone(), rp_data.join(INDEX_DIRECTORY));
                layout.tssp_dirs.insert(key.clone(), rp_data);
                layout.pt_rps.insert(key);
            }
            for rp in sorted_subdirs(&pt_wal)? {
                let key = pt_rp_key(&partition, &rp);
                layout.wal_dirs.insert(key, pt_wal.join(&rp));
            }
        }

        Ok(layout)
    }

    /// De-duplicated retention names across all partitions, sorted.
    pub fn retentions(&self) -> BTreeSet<&str> {
        self.pt_rps.iter().map(|key| retention_of(key)).collect()
    }
}

/// Resolves all database layouts for an export job.
///
/// Semantics of the filters:
/// - no db filter: every directory under `data/` is a database; an rp filter
///   is rejected (`AmbiguousFilter`)
/// - multiple dbs: each is resolved; an rp filter is rejected
/// - single db: the rp filter, when present, must resolve under every
///   partition in both trees
///
/// # Errors
///
/// Returns `MissingDirectory` when the canonical `data/`/`wal/`
/// subdirectories (or a filtered database) are absent, `AmbiguousFilter` and
/// `InvalidRetention` per the rules above.
pub fn resolve_layouts(
    segment_root: &Path,
    wal_root: &Path,
    db_filter: &str,
    rp_filter: &str,
) -> Result<Vec<DatabaseLayout>> {
    let data_root = segment_root.join(DATA_DIRECTORY);
    if !data_root.is_dir() {
        return Err(ExportError::MissingDirectory(data_root));
    }
    let wal_root = wal_root.join(WAL_DIRECTORY);
    if !wal_root.is_dir() {
        return Err(ExportError::MissingDirectory(wal_root));
    }

    let databases: Vec<String> = if db_filter.is_empty() {
        sorted_subdirs(&data_root)?
    } else {
        db_filter
            .split(',')
            .filter(|db| !db.is_empty())
            .map(|db| db.to_string())
            .collect()
    };

    // Retention scoping requires exactly one database.
    if !rp_filter.is_empty() && (db_filter.is_empty() || databases.len() != 1) {
        return Err(ExportError::AmbiguousFilter);
    }
    let rp_filter = (!rp_filter.is_empty()).then_some(rp_filter);

    let mut layouts = Vec::with_capacity(databases.len());
    for database in &databases {
        layouts.push(DatabaseLayout::resolve(
            &data_root, &wal_root, database, rp_filter,
        )?);
    }
    Ok(layouts)
}

/// Lists the subdirectory names of a directory, sorted by name.
fn sorted_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

//! Shared fixtures: builds openGemini-shaped storage trees under a temp
//! directory and runs the exporter against them.

// Not every test binary uses every helper.
#![allow(dead_code)]

use gemexport::export::{ExportConfig, Exporter};
use gemexport::index::IndexBuilder;
use gemexport::record::{ColumnValues, FieldSchema, FieldType, Row, Tag, TIME_COLUMN};
use gemexport::series::encode_series_key;
use gemexport::tssp::{Chunk, TsspWriter};
use gemexport::wal::write_frame;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A storage tree rooted in a temp directory, with `data/` and `wal/`
/// subtrees as the engine lays them out.
pub struct Fixture {
    pub root: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("data")).unwrap();
        fs::create_dir_all(root.path().join("wal")).unwrap();
        Self { root }
    }

    /// An export config pointing both roots at this tree.
    pub fn config(&self, format: &str) -> ExportConfig {
        ExportConfig {
            format: format.to_string(),
            data_dir: self.root.path().to_path_buf(),
            wal_dir: self.root.path().to_path_buf(),
            ..Default::default()
        }
    }

    /// Creates an empty database on both sides.
    pub fn add_db(&self, db: &str) {
        fs::create_dir_all(self.root.path().join("data").join(db)).unwrap();
        fs::create_dir_all(self.root.path().join("wal").join(db)).unwrap();
    }

    /// Creates a `(partition, retention)` pair on both sides.
    pub fn add_rp(&self, db: &str, pt: &str, rp: &str) {
        fs::create_dir_all(self.data_rp(db, pt, rp)).unwrap();
        fs::create_dir_all(self.wal_rp(db, pt, rp)).unwrap();
    }

    pub fn data_rp(&self, db: &str, pt: &str, rp: &str) -> PathBuf {
        self.root.path().join("data").join(db).join(pt).join(rp)
    }

    pub fn wal_rp(&self, db: &str, pt: &str, rp: &str) -> PathBuf {
        self.root.path().join("wal").join(db).join(pt).join(rp)
    }

    /// Writes a segment file under
    /// `data/<db>/<pt>/<rp>/<shard>/tssp/<mst_dir>[/out-of-order]/<file>`.
    #[allow(clippy::too_many_arguments)]
    pub fn write_segment(
        &self,
        db: &str,
        pt: &str,
        rp: &str,
        shard: &str,
        mst_dir: &str,
        file: &str,
        out_of_order: bool,
        chunks: &[Chunk],
    ) {
        let mut dir = self.data_rp(db, pt, rp).join(shard).join("tssp").join(mst_dir);
        if out_of_order {
            dir = dir.join("out-of-order");
        }
        fs::create_dir_all(&dir).unwrap();

        let mut writer = TsspWriter::create(&dir.join(file)).unwrap();
        for chunk in chunks {
            writer.write_chunk(chunk).unwrap();
        }
        writer.finish().unwrap();
    }

    /// Writes one index part under
    /// `data/<db>/<pt>/<rp>/index/<dir_name>/000001.msi`.
    pub fn write_index(
        &self,
        db: &str,
        pt: &str,
        rp: &str,
        dir_name: &str,
        entries: &[(u64, Vec<u8>)],
    ) {
        let dir = self.data_rp(db, pt, rp).join("index").join(dir_name);
        fs::create_dir_all(&dir).unwrap();

        let mut builder = IndexBuilder::new();
        for (sid, key) in entries {
            builder.add_series(*sid, key.clone());
        }
        builder.write_part(&dir.join("000001.msi")).unwrap();
    }

    /// Writes a WAL file of the given frames under `wal/<db>/<pt>/<rp>/<file>`.
    pub fn write_wal_file(&self, db: &str, pt: &str, rp: &str, file: &str, frames: &[Vec<Row>]) -> PathBuf {
        let dir = self.wal_rp(db, pt, rp);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);

        let mut out = File::create(&path).unwrap();
        for rows in frames {
            write_frame(&mut out, rows).unwrap();
        }
        path
    }
}

/// A chunk with one float field column.
pub fn float_chunk(sid: u64, field: &str, points: &[(i64, f64)]) -> Chunk {
    let times: Vec<i64> = points.iter().map(|(t, _)| *t).collect();
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    Chunk::new(
        sid,
        vec![
            FieldSchema::new(field, FieldType::Float),
            FieldSchema::new(TIME_COLUMN, FieldType::Integer),
        ],
        vec![ColumnValues::Float(values)],
        times,
    )
    .unwrap()
}

/// A chunk with one integer field column.
pub fn int_chunk(sid: u64, field: &str, points: &[(i64, i64)]) -> Chunk {
    let times: Vec<i64> = points.iter().map(|(t, _)| *t).collect();
    let values: Vec<i64> = points.iter().map(|(_, v)| *v).collect();
    Chunk::new(
        sid,
        vec![
            FieldSchema::new(field, FieldType::Integer),
            FieldSchema::new(TIME_COLUMN, FieldType::Integer),
        ],
        vec![ColumnValues::Integer(values)],
        times,
    )
    .unwrap()
}

/// The canonical encoded series key for a measurement and tag list.
pub fn series_key(measurement: &str, tags: &[(&str, &str)]) -> Vec<u8> {
    let tags: Vec<Tag> = tags.iter().map(|(k, v)| Tag::new(*k, *v)).collect();
    encode_series_key(measurement, &tags)
}

/// Runs an export into a file next to the fixture and returns the dump and
/// the reported line count.
pub fn run_export(mut config: ExportConfig, out_dir: &Path) -> (String, u64) {
    let out_path = out_dir.join("dump.out");
    config.out = out_path.display().to_string();

    let mut exporter = Exporter::new(config).unwrap();
    let count = exporter.run().unwrap();
    (fs::read_to_string(&out_path).unwrap(), count)
}

/// Counts the data lines of a dump: non-empty lines that are neither
/// comments nor DDL statements.
pub fn data_line_count(dump: &str) -> u64 {
    dump.lines()
        .filter(|line| {
            !line.is_empty() && !line.starts_with('#') && !line.starts_with("CREATE ")
        })
        .count() as u64
}

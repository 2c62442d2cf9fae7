//! Export driver.
//!
//! Orchestrates the full export: resolve the on-disk layout, walk segment,
//! index, and WAL files into work units keyed by `"<db>:<rp>"`, then stream
//! everything through the configured formatter into the output sink.
//!
//! The export is single-threaded and synchronous. Output is deterministic
//! for a fixed disk layout: databases, partitions, retentions, work-unit
//! keys, measurements, and file lists are all enumerated sorted by name.
//!
//! ```text
//! disk ──► TsspReader / WalReader ──► DataFilter ──► LineFormat ──► sink
//! ```
//!
//! The sink chain is `file → 1 MiB buffer → optional gzip`, closed in
//! reverse order on every exit path.

pub mod filter;
pub mod format;
pub mod layout;

use crate::error::{ExportError, Result};
use crate::index::MergeSetIndex;
use crate::record::strip_version_suffix;
use crate::tssp::shard::TSSP_FILE_EXTENSION;
use crate::tssp::{locate_shard_dir, parse_index_dir, parse_shard_dir, TsspReader};
use crate::wal::{WalReader, WAL_FILE_EXTENSION};
use filter::DataFilter;
use flate2::write::GzEncoder;
use flate2::Compression;
use format::{line_format, LineFormat};
use layout::{resolve_layouts, retention_of, DatabaseLayout};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Output path that selects stdout.
pub const STDOUT_MARK: &str = "-";

/// Buffer size of the output writer (1 MiB).
const WRITER_BUFFER_SIZE: usize = 1024 * 1024;

/// Configuration of one export job.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Output format: `txt` or `csv`.
    pub format: String,
    /// Output path, or `-` for stdout.
    pub out: String,
    /// Segment root (the directory containing `data/`).
    pub data_dir: PathBuf,
    /// WAL root (the directory containing `wal/`).
    pub wal_dir: PathBuf,
    /// Comma-separated retention policies to export; empty exports all.
    pub retentions: String,
    /// Comma-separated databases to export; empty exports all.
    pub db_filter: String,
    /// Comma-separated measurements to export; empty exports all.
    pub measurement_filter: String,
    /// Time range of the form `<rfc3339>~<rfc3339>`; empty exports all.
    pub time_filter: String,
    /// Gzip-compress the output stream.
    pub compress: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: format::TXT_FORMAT.to_string(),
            out: STDOUT_MARK.to_string(),
            data_dir: PathBuf::new(),
            wal_dir: PathBuf::new(),
            retentions: String::new(),
            db_filter: String::new(),
            measurement_filter: String::new(),
            time_filter: String::new(),
            compress: false,
        }
    }
}

/// The export driver.
///
/// Constructed with [`Exporter::new`], which validates the format, compiles
/// the filter, and resolves the directory layout; [`Exporter::run`] walks
/// the storage tree and writes the dump.
pub struct Exporter {
    config: ExportConfig,
    filter: DataFilter,
    layouts: Vec<DatabaseLayout>,
    format: Box<dyn LineFormat>,
    /// Work-unit keys (`"<db>:<rp>"`) that own any files or indexes.
    manifest: BTreeSet<String>,
    /// Per work unit: measurement → sorted segment file paths.
    tssp_files: BTreeMap<String, BTreeMap<String, Vec<PathBuf>>>,
    /// Per work unit: sorted WAL file paths.
    wal_files: BTreeMap<String, Vec<PathBuf>>,
    /// Per work unit: index id → index directory, opened lazily per unit.
    index_dirs: BTreeMap<String, Vec<(u64, PathBuf)>>,
    line_count: u64,
    cancel: Arc<AtomicBool>,
}

impl Exporter {
    /// Creates an exporter, validating the configuration and resolving the
    /// on-disk layout.
    pub fn new(config: ExportConfig) -> Result<Self> {
        let format = line_format(&config.format)?;
        let filter = DataFilter::new(&config.measurement_filter, &config.time_filter)?;
        let layouts = resolve_layouts(
            &config.data_dir,
            &config.wal_dir,
            &config.db_filter,
            &config.retentions,
        )?;

        Ok(Self {
            config,
            filter,
            layouts,
            format,
            manifest: BTreeSet::new(),
            tssp_files: BTreeMap::new(),
            wal_files: BTreeMap::new(),
            index_dirs: BTreeMap::new(),
            line_count: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns a flag that cancels the export when set. Cancellation is
    /// observed between work units and between segment files; the sink is
    /// flushed and closed before [`ExportError::Cancelled`] is returned.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Number of data lines written by the last [`Exporter::run`].
    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    /// Runs the export and returns the number of data lines written.
    pub fn run(&mut self) -> Result<u64> {
        let layouts = std::mem::take(&mut self.layouts);
        for layout in &layouts {
            self.walk_database(layout)?;
        }
        self.layouts = layouts;

        let mut line_count = 0u64;
        self.write(&mut line_count)?;
        self.line_count = line_count;
        Ok(line_count)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }

    /// Records all segment files, index directories, and WAL files of one
    /// database into its work units.
    fn walk_database(&mut self, db: &DatabaseLayout) -> Result<()> {
        for pt_rp in &db.pt_rps {
            let unit_key = format!("{}:{}", db.name, retention_of(pt_rp));

            self.walk_tssp_dir(db, pt_rp, &unit_key)?;
            self.walk_index_dir(db, pt_rp, &unit_key)?;
            self.walk_wal_dir(db, pt_rp, &unit_key)?;
        }
        Ok(())
    }

    fn walk_tssp_dir(&mut self, db: &DatabaseLayout, pt_rp: &str, unit_key: &str) -> Result<()> {
        let mut files = Vec::new();
        walk_files_sorted(&db.tssp_dirs[pt_rp], TSSP_FILE_EXTENSION, &mut files)?;

        for path in files {
            let measurement = crate::tssp::shard::measurement_of(&path)?;
            if !self.filter.measurement_accepted(&measurement) {
                continue;
            }
            self.manifest.insert(unit_key.to_string());
            self.tssp_files
                .entry(unit_key.to_string())
                .or_default()
                .entry(measurement)
                .or_default()
                .push(path);
        }
        Ok(())
    }

    fn walk_index_dir(&mut self, db: &DatabaseLayout, pt_rp: &str, unit_key: &str) -> Result<()> {
        let index_root = &db.index_dirs[pt_rp];
        if !index_root.is_dir() {
            // No segments were ever flushed under this retention.
            return Ok(());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(index_root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        for name in names {
            let index_id = parse_index_dir(&name)?;
            self.manifest.insert(unit_key.to_string());
            self.index_dirs
                .entry(unit_key.to_string())
                .or_default()
                .push((index_id, index_root.join(&name)));
        }
        Ok(())
    }

    fn walk_wal_dir(&mut self, db: &DatabaseLayout, pt_rp: &str, unit_key: &str) -> Result<()> {
        let Some(wal_dir) = db.wal_dirs.get(pt_rp) else {
            return Ok(());
        };
        let mut files = Vec::new();
        walk_files_sorted(wal_dir, WAL_FILE_EXTENSION, &mut files)?;

        for path in files {
            self.manifest.insert(unit_key.to_string());
            self.wal_files
                .entry(unit_key.to_string())
                .or_default()
                .push(path);
        }
        Ok(())
    }

    /// Opens the output sink and writes the full dump through it.
    fn write(&self, line_count: &mut u64) -> Result<()> {
        let to_stdout = self.config.out == STDOUT_MARK;
        let progress = Progress { to_stderr: to_stdout };

        let raw: Box<dyn Write> = if to_stdout {
            Box::new(io::stdout())
        } else {
            Box::new(File::create(&self.config.out)?)
        };
        let buffered = BufWriter::with_capacity(WRITER_BUFFER_SIZE, raw);
        let mut sink = if self.config.compress {
            OutputSink::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            OutputSink::Plain(buffered)
        };

        let result = self.write_full(&mut sink, &progress, line_count);

        // Close gzip → buffer → file on every exit path.
        let close_result = sink.finish().map_err(ExportError::from);
        result.and(close_result)?;

        progress.log(&format!("Summarize {} line protocol", line_count));
        Ok(())
    }

    fn write_full(
        &self,
        out: &mut OutputSink,
        progress: &Progress,
        line_count: &mut u64,
    ) -> Result<()> {
        let start = format_rfc3339(self.filter.start_ns());
        let end = format_rfc3339(self.filter.end_ns());
        write!(out, "# openGemini EXPORT: {} - {}\n\n", start, end)?;

        self.write_ddl(out)?;
        self.write_dml(out, progress, line_count)?;
        Ok(())
    }

    /// Writes the DDL block: every resolved database and its retentions,
    /// whether or not they produced data.
    fn write_ddl(&self, out: &mut OutputSink) -> Result<()> {
        write!(out, "# DDL\n\n")?;
        for db in &self.layouts {
            writeln!(out, "CREATE DATABASE {}", db.name)?;
            for rp in db.retentions() {
                writeln!(
                    out,
                    "CREATE RETENTION POLICY {} ON {} DURATION 0s REPLICATION 1",
                    rp, db.name
                )?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Writes the DML block: per work unit, the segment stream then the WAL
    /// stream. Index handles are opened per unit and released at its end.
    fn write_dml(
        &self,
        out: &mut OutputSink,
        progress: &Progress,
        line_count: &mut u64,
    ) -> Result<()> {
        write!(out, "# DML\n\n")?;

        let mut current_db = "";
        for unit_key in &self.manifest {
            self.check_cancelled()?;

            let (db, rp) = unit_key
                .split_once(':')
                .ok_or_else(|| ExportError::InvalidDataDir(unit_key.clone()))?;
            if db != current_db {
                write!(out, "# CONTEXT-DATABASE: {}\n\n", db)?;
                current_db = db;
            }
            write!(out, "# CONTEXT-RETENTION-POLICY: {}\n\n", rp)?;

            let indexes = self.open_indexes(unit_key)?;

            if let Some(measurements) = self.tssp_files.get(unit_key) {
                progress.log(&format!("writing out tssp file data for {}...", unit_key));
                write!(out, "# FROM TSSP FILE.\n\n")?;
                for (measurement, files) in measurements {
                    writeln!(out, "# CONTEXT-MEASUREMENT: {}", measurement)?;
                    let mut header_written = false;
                    for file in files {
                        self.check_cancelled()?;
                        let index = lookup_index(&indexes, file)?;
                        if !header_written {
                            header_written = self.write_measurement_header(out, file, index)?;
                        }
                        self.write_tssp_file(out, file, index, line_count)?;
                    }
                    writeln!(out)?;
                }
                progress.log("complete.");
            }

            if let Some(files) = self.wal_files.get(unit_key) {
                progress.log(&format!("writing out wal file data for {}...", unit_key));
                write!(out, "# FROM WAL FILE.\n\n")?;
                for file in files {
                    self.check_cancelled()?;
                    self.write_wal_file(out, file, line_count)?;
                }
                writeln!(out)?;
                progress.log("complete.");
            }

            // Index handles for this unit are released here.
            drop(indexes);
        }
        Ok(())
    }

    /// Opens every index handle of a work unit.
    fn open_indexes(&self, unit_key: &str) -> Result<BTreeMap<u64, MergeSetIndex>> {
        let mut indexes = BTreeMap::new();
        if let Some(dirs) = self.index_dirs.get(unit_key) {
            for (index_id, dir) in dirs {
                let index = MergeSetIndex::open(dir)?;
                debug!(
                    "opened index {} with {} series from {}",
                    index_id,
                    index.len(),
                    dir.display()
                );
                indexes.insert(*index_id, index);
            }
        }
        Ok(indexes)
    }

    /// Emits the one-time measurement header from a segment file's first
    /// chunk. Returns false if the file holds no chunks.
    fn write_measurement_header(
        &self,
        out: &mut OutputSink,
        file: &Path,
        index: &MergeSetIndex,
    ) -> Result<bool> {
        let reader = TsspReader::open(file)?;
        let Some(chunk) = reader.chunks()?.next() else {
            return Ok(false);
        };
        let chunk = chunk?;
        if chunk.series_id == 0 {
            return Err(ExportError::ZeroSeriesId);
        }
        let keys = index.resolve_series_keys(chunk.series_id)?;
        self.format
            .write_measurement_header(out, &keys[0], &chunk.schema)?;
        Ok(true)
    }

    /// Streams every accepted row of one segment file.
    fn write_tssp_file(
        &self,
        out: &mut OutputSink,
        file: &Path,
        index: &MergeSetIndex,
        line_count: &mut u64,
    ) -> Result<()> {
        let reader = TsspReader::open(file)?;
        let mut prefix = Vec::new();
        let mut line = Vec::new();

        for chunk in reader.chunks()? {
            let chunk = chunk?;
            if chunk.series_id == 0 {
                return Err(ExportError::ZeroSeriesId);
            }
            if self.filter.chunk_skippable(chunk.min_ts, chunk.max_ts) {
                continue;
            }

            let keys = index.resolve_series_keys(chunk.series_id)?;
            prefix.clear();
            self.format.append_series_prefix(&keys[0], &mut prefix)?;

            for row in 0..chunk.row_count() {
                if !self.filter.accept(chunk.times[row]) {
                    continue;
                }
                line.clear();
                line.extend_from_slice(&prefix);
                self.format.append_record_fields(&chunk, row, &mut line);
                out.write_all(&line)?;
                *line_count += 1;
            }
        }
        Ok(())
    }

    /// Streams every accepted row of one WAL file. Damaged frames end the
    /// file silently; the reader has already logged them.
    fn write_wal_file(
        &self,
        out: &mut OutputSink,
        file: &Path,
        line_count: &mut u64,
    ) -> Result<()> {
        let mut line = Vec::new();
        for row in WalReader::open(file)? {
            let measurement = strip_version_suffix(&row.name).to_string();
            if !self.filter.measurement_accepted(&measurement) {
                continue;
            }
            if !self.filter.accept(row.timestamp) {
                continue;
            }
            line.clear();
            self.format.append_wal_row(&measurement, &row, &mut line);
            out.write_all(&line)?;
            *line_count += 1;
        }
        Ok(())
    }
}

/// Looks up the opened index handle for a segment file's shard directory.
fn lookup_index<'a>(
    indexes: &'a BTreeMap<u64, MergeSetIndex>,
    file: &Path,
) -> Result<&'a MergeSetIndex> {
    let (shard_dir, _is_order) = locate_shard_dir(file)?;
    let (_shard_id, index_id) = parse_shard_dir(&shard_dir)?;
    indexes.get(&index_id).ok_or_else(|| {
        ExportError::InvalidDataDir(format!(
            "no opened index {} for {}",
            index_id,
            file.display()
        ))
    })
}

/// Progress log sink: stderr when the dump goes to stdout, stdout otherwise.
struct Progress {
    to_stderr: bool,
}

impl Progress {
    fn log(&self, msg: &str) {
        if self.to_stderr {
            eprintln!("export: {}", msg);
        } else {
            println!("export: {}", msg);
        }
    }
}

/// The output sink chain. Writes pass through the optional gzip layer into
/// the 1 MiB buffer and on to the file or stdout.
enum OutputSink {
    /// Uncompressed output.
    Plain(BufWriter<Box<dyn Write>>),
    /// Gzip-compressed output.
    Gzip(GzEncoder<BufWriter<Box<dyn Write>>>),
}

impl OutputSink {
    /// Closes the chain in order: gzip trailer, then buffer flush.
    fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut writer) => writer.flush(),
            Self::Gzip(encoder) => {
                let mut writer = encoder.finish()?;
                writer.flush()
            }
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(writer) => writer.write(buf),
            Self::Gzip(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(writer) => writer.flush(),
            Self::Gzip(writer) => writer.flush(),
        }
    }
}

/// Formats a nanosecond timestamp as RFC3339 UTC with whole seconds.
fn format_rfc3339(ns: i64) -> String {
    chrono::DateTime::from_timestamp_nanos(ns)
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Collects files with the given extension under `dir`, recursively, in
/// sorted path order.
fn walk_files_sorted(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        entries.push(entry?.path());
    }
    entries.sort();

    for path in entries {
        if path.is_dir() {
            walk_files_sorted(&path, extension, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    Ok(())
}

//! Gemexport CLI
//!
//! Command-line front-end for the offline TSSP exporter:
//!
//! ```bash
//! gemexport --format txt --out dump.txt \
//!     --data /tmp/openGemini/data --wal /tmp/openGemini/data \
//!     --dbfilter db0 --retention autogen \
//!     --timefilter 2021-01-01T00:00:00Z~2021-01-02T00:00:00Z
//! ```
//!
//! Diagnostics go to stderr so a stdout dump (`--out -`) stays clean.

use clap::Parser;
use gemexport::export::{ExportConfig, Exporter};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gemexport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Export data from openGemini storage to line protocol or CSV")]
struct Cli {
    /// Export data format, support csv, txt
    #[arg(long)]
    format: String,

    /// Destination file to export to, or - for stdout
    #[arg(long)]
    out: String,

    /// Data storage path to export
    #[arg(long)]
    data: PathBuf,

    /// WAL storage path to export
    #[arg(long)]
    wal: PathBuf,

    /// Retention policies to export, e.g. rp0,rp1
    #[arg(long, default_value = "")]
    retention: String,

    /// Databases to export, e.g. db0,db1
    #[arg(long, default_value = "")]
    dbfilter: String,

    /// Measurements to export, e.g. mst0,mst1
    #[arg(long, default_value = "")]
    mstfilter: String,

    /// Export time range of the form start~end, both halves RFC3339
    #[arg(long, default_value = "")]
    timefilter: String,

    /// Compress the export output with gzip
    #[arg(long)]
    compress: bool,

    /// Concurrent threads number (accepted for compatibility; the export
    /// stream itself is single-threaded)
    #[arg(long, default_value_t = 1)]
    concurrent: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| "gemexport=warn".into()),
            ),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.concurrent == 0 {
        eprintln!("export: --concurrent must be at least 1");
        return ExitCode::FAILURE;
    }

    let config = ExportConfig {
        format: cli.format,
        out: cli.out,
        data_dir: cli.data,
        wal_dir: cli.wal,
        retentions: cli.retention,
        db_filter: cli.dbfilter,
        measurement_filter: cli.mstfilter,
        time_filter: cli.timefilter,
        compress: cli.compress,
    };

    let mut exporter = match Exporter::new(config) {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("export: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match exporter.run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("export: {}", e);
            ExitCode::FAILURE
        }
    }
}

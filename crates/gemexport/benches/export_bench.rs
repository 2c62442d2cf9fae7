//! Benchmarks for the export pipeline.
//!
//! Run with: cargo bench --package gemexport
//!
//! ## Benchmark Categories
//!
//! - **Row Formatting**: txt/csv line emission
//! - **WAL Decoding**: row-batch unmarshal and frame reads
//! - **Segment I/O**: chunk write and streaming read

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gemexport::export::format::{line_format, LineFormat, CSV_FORMAT, TXT_FORMAT};
use gemexport::record::{
    ColumnValues, Field, FieldSchema, FieldType, FieldValue, Row, Tag, TIME_COLUMN,
};
use gemexport::series::encode_series_key;
use gemexport::tssp::{Chunk, TsspReader, TsspWriter};
use gemexport::wal::{marshal_rows, unmarshal_rows, write_frame, WalReader};
use tempfile::TempDir;

/// A chunk with one float column and regular 1s timestamps.
fn generate_chunk(sid: u64, count: usize) -> Chunk {
    let times: Vec<i64> = (0..count).map(|i| 1_000_000_000 + (i as i64) * 1_000_000_000).collect();
    let values: Vec<f64> = (0..count).map(|i| 50.0 + (i as f64 * 0.1).sin()).collect();
    Chunk::new(
        sid,
        vec![
            FieldSchema::new("value", FieldType::Float),
            FieldSchema::new(TIME_COLUMN, FieldType::Integer),
        ],
        vec![ColumnValues::Float(values)],
        times,
    )
    .unwrap()
}

fn generate_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| Row {
            name: "cpu_0000".to_string(),
            tags: vec![
                Tag::new("host", format!("server{}", i % 10)),
                Tag::new("region", "us-east"),
            ],
            fields: vec![
                Field::new("usage", FieldValue::Float(0.5 + i as f64 * 0.001)),
                Field::new("cores", FieldValue::Integer(8)),
            ],
            timestamp: 1_000_000_000 + (i as i64) * 1_000_000,
        })
        .collect()
}

fn bench_row_formatting(c: &mut Criterion) {
    let chunk = generate_chunk(1, 10_000);
    let key = encode_series_key("cpu_0000", &[Tag::new("host", "server1")]);

    let mut group = c.benchmark_group("format_chunk_rows");
    for format_name in [TXT_FORMAT, CSV_FORMAT] {
        let format = line_format(format_name).unwrap();
        let mut prefix = Vec::new();
        format.append_series_prefix(&key, &mut prefix).unwrap();

        group.throughput(Throughput::Elements(chunk.row_count() as u64));
        group.bench_function(BenchmarkId::from_parameter(format_name), |b| {
            let mut line = Vec::new();
            b.iter(|| {
                let mut written = 0usize;
                for row in 0..chunk.row_count() {
                    line.clear();
                    line.extend_from_slice(&prefix);
                    format.append_record_fields(black_box(&chunk), row, &mut line);
                    written += line.len();
                }
                black_box(written)
            })
        });
    }
    group.finish();
}

fn bench_wal_unmarshal(c: &mut Criterion) {
    let mut group = c.benchmark_group("wal_unmarshal");

    for size in [100, 1_000, 10_000].iter() {
        let body = marshal_rows(&generate_rows(*size));
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.iter(|| unmarshal_rows(black_box(body)).unwrap())
        });
    }

    group.finish();
}

fn bench_wal_file_read(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bench.wal");

    {
        let mut file = std::fs::File::create(&path).unwrap();
        for batch in generate_rows(10_000).chunks(500) {
            write_frame(&mut file, batch).unwrap();
        }
    }

    c.bench_function("wal_read_10k_rows", |b| {
        b.iter(|| {
            let count = WalReader::open(&path).unwrap().count();
            black_box(count)
        })
    });
}

fn bench_tssp_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("tssp_write");

    for size in [1_000, 10_000].iter() {
        let chunk = generate_chunk(1, *size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &chunk, |b, chunk| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |temp_dir| {
                    let path = temp_dir.path().join("bench.tssp");
                    let mut writer = TsspWriter::create(&path).unwrap();
                    writer.write_chunk(chunk).unwrap();
                    writer.finish().unwrap();
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_tssp_read(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bench.tssp");

    {
        let mut writer = TsspWriter::create(&path).unwrap();
        for sid in 1..=10u64 {
            writer.write_chunk(&generate_chunk(sid, 1_000)).unwrap();
        }
        writer.finish().unwrap();
    }

    c.bench_function("tssp_read_10x1k", |b| {
        b.iter(|| {
            let reader = TsspReader::open(&path).unwrap();
            let mut rows = 0usize;
            for chunk in reader.chunks().unwrap() {
                rows += chunk.unwrap().row_count();
            }
            black_box(rows)
        })
    });
}

criterion_group!(
    benches,
    // Row formatting
    bench_row_formatting,
    // WAL decoding
    bench_wal_unmarshal,
    bench_wal_file_read,
    // Segment I/O
    bench_tssp_write,
    bench_tssp_read,
);
criterion_main!(benches);

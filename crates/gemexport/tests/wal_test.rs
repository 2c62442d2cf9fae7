//! WAL export scenarios: truncation tolerance, corruption isolation, and
//! filter application to WAL rows.

mod common;

use common::{run_export, Fixture};
use gemexport::record::{Field, FieldValue, Row, Tag};
use std::fs;

fn wal_row(city: &str, temperature: f64, timestamp: i64) -> Row {
    Row {
        name: "weather_0000".to_string(),
        tags: vec![Tag::new("city", city.to_string())],
        fields: vec![Field::new("temperature", FieldValue::Float(temperature))],
        timestamp,
    }
}

/// A WAL-only work unit streams its rows under `# FROM WAL FILE.`.
#[test]
fn test_wal_rows_exported() {
    let fixture = Fixture::new();
    fixture.add_rp("foo", "0", "autogen");
    fixture.write_wal_file(
        "foo",
        "0",
        "autogen",
        "1.wal",
        &[vec![wal_row("sh", 21.5, 1000), wal_row("bj", 18.0, 2000)]],
    );

    let (dump, count) = run_export(fixture.config("txt"), fixture.root.path());

    assert_eq!(count, 2);
    assert!(dump.contains("# FROM WAL FILE.\n\n"));
    assert!(!dump.contains("# FROM TSSP FILE."));
    assert!(dump.contains("weather,city=sh temperature=21.5 1000\n"));
    assert!(dump.contains("weather,city=bj temperature=18 2000\n"));
}

/// S6: truncating the final frame loses only that frame's rows; earlier
/// frames still export in full, and no partial line is written.
#[test]
fn test_wal_truncated_last_frame() {
    let fixture = Fixture::new();
    fixture.add_rp("foo", "0", "autogen");
    let path = fixture.write_wal_file(
        "foo",
        "0",
        "autogen",
        "1.wal",
        &[
            vec![wal_row("sh", 1.0, 1000), wal_row("sh", 2.0, 2000)],
            vec![wal_row("sh", 3.0, 3000), wal_row("sh", 4.0, 4000)],
            vec![wal_row("sh", 5.0, 5000), wal_row("sh", 6.0, 6000)],
        ],
    );

    let data = fs::read(&path).unwrap();
    fs::write(&path, &data[..data.len() - 7]).unwrap();

    let (dump, count) = run_export(fixture.config("txt"), fixture.root.path());

    assert_eq!(count, 4);
    assert!(dump.contains("temperature=4 4000\n"));
    assert!(!dump.contains(" 5000\n"));
    assert!(!dump.contains(" 6000\n"));
    for line in dump.lines() {
        if !line.is_empty() && !line.starts_with('#') && !line.starts_with("CREATE ") {
            assert!(line.starts_with("weather,"), "partial line: {:?}", line);
        }
    }
}

/// An empty WAL file contributes no rows and no error.
#[test]
fn test_wal_empty_file() {
    let fixture = Fixture::new();
    fixture.add_rp("foo", "0", "autogen");
    fixture.write_wal_file("foo", "0", "autogen", "1.wal", &[]);

    let (dump, count) = run_export(fixture.config("txt"), fixture.root.path());

    assert_eq!(count, 0);
    assert!(dump.contains("# FROM WAL FILE.\n\n"));
}

/// WAL damage is isolated per file: a corrupt first file does not stop a
/// healthy second file from exporting.
#[test]
fn test_wal_corruption_isolated_per_file() {
    let fixture = Fixture::new();
    fixture.add_rp("foo", "0", "autogen");
    let first = fixture.write_wal_file(
        "foo",
        "0",
        "autogen",
        "1.wal",
        &[vec![wal_row("sh", 1.0, 1000)]],
    );
    fixture.write_wal_file(
        "foo",
        "0",
        "autogen",
        "2.wal",
        &[vec![wal_row("bj", 2.0, 2000)]],
    );

    // Chop the first file mid-frame.
    let data = fs::read(&first).unwrap();
    fs::write(&first, &data[..data.len() / 2]).unwrap();

    let (dump, count) = run_export(fixture.config("txt"), fixture.root.path());

    assert_eq!(count, 1);
    assert!(dump.contains("weather,city=bj temperature=2 2000\n"));
}

/// The measurement and time filters apply to WAL rows too.
#[test]
fn test_wal_rows_filtered() {
    let fixture = Fixture::new();
    fixture.add_rp("foo", "0", "autogen");
    let other = Row {
        name: "pressure_0000".to_string(),
        tags: vec![Tag::new("city", "sh")],
        fields: vec![Field::new("value", FieldValue::Integer(3))],
        timestamp: 1500,
    };
    fixture.write_wal_file(
        "foo",
        "0",
        "autogen",
        "1.wal",
        &[vec![wal_row("sh", 1.0, 1000), wal_row("sh", 2.0, 2000), other]],
    );

    let mut config = fixture.config("txt");
    config.measurement_filter = "weather".to_string();
    config.time_filter = "~1970-01-01T00:00:00.0000015Z".to_string();
    let (dump, count) = run_export(config, fixture.root.path());

    assert_eq!(count, 1);
    assert!(dump.contains("weather,city=sh temperature=1 1000\n"));
    assert!(!dump.contains(" 2000\n"));
    assert!(!dump.contains("pressure"));
}

/// WAL rows honor the configured output format.
#[test]
fn test_wal_rows_csv() {
    let fixture = Fixture::new();
    fixture.add_rp("foo", "0", "autogen");
    fixture.write_wal_file(
        "foo",
        "0",
        "autogen",
        "1.wal",
        &[vec![wal_row("sh", 21.5, 1000)]],
    );

    let (dump, count) = run_export(fixture.config("csv"), fixture.root.path());

    assert_eq!(count, 1);
    assert!(dump.contains("sh,21.5,1000\n"));
}

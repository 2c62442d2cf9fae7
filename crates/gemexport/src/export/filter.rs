//! Measurement and time-range filtering.

use crate::error::{ExportError, Result};
use std::collections::BTreeSet;

/// Compiled row and chunk acceptance filter.
///
/// The time filter is the closed interval `[start_ns, end_ns]`; when both
/// endpoints are absent it degrades to `[i64::MIN, i64::MAX]`. An empty
/// measurement set accepts every measurement.
#[derive(Debug, Clone)]
pub struct DataFilter {
    measurements: BTreeSet<String>,
    start_ns: i64,
    end_ns: i64,
}

impl DataFilter {
    /// Compiles a filter from the CLI filter strings.
    ///
    /// `mst_filter` is a comma-separated measurement list (empty entries are
    /// skipped); `time_filter` has the form `<rfc3339>~<rfc3339>` with either
    /// half optional.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::InvalidTimeRange` if the time filter is
    /// non-empty but lacks the `~` separator, a half fails to parse as
    /// RFC3339, or start exceeds end.
    pub fn new(mst_filter: &str, time_filter: &str) -> Result<Self> {
        let measurements: BTreeSet<String> = mst_filter
            .split(',')
            .filter(|m| !m.is_empty())
            .map(|m| m.to_string())
            .collect();

        let (start_ns, end_ns) = parse_time_filter(time_filter)?;
        if start_ns > end_ns {
            return Err(ExportError::InvalidTimeRange(time_filter.to_string()));
        }

        Ok(Self {
            measurements,
            start_ns,
            end_ns,
        })
    }

    /// Returns true if the timestamp lies inside the closed interval.
    pub fn accept(&self, t: i64) -> bool {
        t >= self.start_ns && t <= self.end_ns
    }

    /// Returns true if a chunk with the given time bounds lies entirely
    /// outside the interval and can be skipped without per-row work.
    pub fn chunk_skippable(&self, min_ts: i64, max_ts: i64) -> bool {
        max_ts < self.start_ns || min_ts > self.end_ns
    }

    /// Returns true if the measurement passes the measurement filter.
    pub fn measurement_accepted(&self, name: &str) -> bool {
        self.measurements.is_empty() || self.measurements.contains(name)
    }

    /// Inclusive lower bound in nanoseconds.
    pub fn start_ns(&self) -> i64 {
        self.start_ns
    }

    /// Inclusive upper bound in nanoseconds.
    pub fn end_ns(&self) -> i64 {
        self.end_ns
    }
}

fn parse_time_filter(time_filter: &str) -> Result<(i64, i64)> {
    if time_filter.is_empty() {
        return Ok((i64::MIN, i64::MAX));
    }
    let (start, end) = time_filter
        .split_once('~')
        .ok_or_else(|| ExportError::InvalidTimeRange(time_filter.to_string()))?;

    let start_ns = match start {
        "" => i64::MIN,
        s => parse_rfc3339_nanos(s)?,
    };
    let end_ns = match end {
        "" => i64::MAX,
        s => parse_rfc3339_nanos(s)?,
    };
    Ok((start_ns, end_ns))
}

fn parse_rfc3339_nanos(s: &str) -> Result<i64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .and_then(|dt| dt.timestamp_nanos_opt())
        .ok_or_else(|| ExportError::InvalidTimeRange(s.to_string()))
}

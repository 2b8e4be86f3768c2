//! Snapshot metrics computed from `WeatherState`.
//!
//! `compute_metrics(&WeatherState) -> MetricsSnapshot` samples the current
//! state for time-series analysis. No state mutation. The CSV helpers below
//! are the only IO and take their writer or path from the caller.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::WeatherState;

/// Current schema version. Bump when fields are added/removed/reordered.
const METRICS_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub tick: u64,
    pub metrics_version: u32,
    pub elapsed_secs: u64,

    // Regions
    pub regions_total: u32,
    pub regions_clear: u32,
    pub regions_active: u32,
    pub regions_uninitialized: u32,

    pub transitions_total: u64,

    /// Regions currently showing each non-clear weather, keyed by weather id.
    pub weather_counts: BTreeMap<String, u32>,
}

impl MetricsSnapshot {
    /// Fraction of initialized regions with active weather.
    pub fn active_fraction(&self) -> f64 {
        let initialized = self.regions_total - self.regions_uninitialized;
        if initialized == 0 {
            0.0
        } else {
            f64::from(self.regions_active) / f64::from(initialized)
        }
    }
}

pub fn compute_metrics(state: &WeatherState) -> MetricsSnapshot {
    let mut regions_clear = 0u32;
    let mut regions_active = 0u32;
    let mut regions_uninitialized = 0u32;
    let mut weather_counts: BTreeMap<String, u32> = BTreeMap::new();

    for region in state.regions.values() {
        if !region.initialized {
            regions_uninitialized += 1;
            continue;
        }
        match &region.current {
            None => regions_clear += 1,
            Some(weather) => {
                regions_active += 1;
                *weather_counts.entry(weather.to_string()).or_insert(0) += 1;
            }
        }
    }

    MetricsSnapshot {
        tick: state.meta.tick,
        metrics_version: METRICS_VERSION,
        elapsed_secs: state.meta.now.as_secs(),
        regions_total: u32::try_from(state.regions.len()).unwrap_or(u32::MAX),
        regions_clear,
        regions_active,
        regions_uninitialized,
        transitions_total: state.counters.transitions_total,
        weather_counts,
    }
}

pub fn write_metrics_header(writer: &mut impl std::io::Write) -> std::io::Result<()> {
    writeln!(
        writer,
        "tick,metrics_version,elapsed_secs,\
         regions_total,regions_clear,regions_active,regions_uninitialized,\
         transitions_total,weather_counts"
    )
}

/// `weather_counts` is flattened to `Id:count` pairs joined by `;`.
pub fn append_metrics_row(
    writer: &mut impl std::io::Write,
    snapshot: &MetricsSnapshot,
) -> std::io::Result<()> {
    let weather_counts = snapshot
        .weather_counts
        .iter()
        .map(|(weather, count)| format!("{weather}:{count}"))
        .collect::<Vec<_>>()
        .join(";");
    writeln!(
        writer,
        "{},{},{},{},{},{},{},{},{}",
        snapshot.tick,
        snapshot.metrics_version,
        snapshot.elapsed_secs,
        snapshot.regions_total,
        snapshot.regions_clear,
        snapshot.regions_active,
        snapshot.regions_uninitialized,
        snapshot.transitions_total,
        weather_counts,
    )
}

pub fn write_metrics_csv(path: &str, snapshots: &[MetricsSnapshot]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    write_metrics_header(&mut file)?;
    for snapshot in snapshots {
        append_metrics_row(&mut file, snapshot)?;
    }
    Ok(())
}

/// Maximum data rows per CSV file before rotating to a new file.
const MAX_ROWS_PER_FILE: usize = 50_000;

/// Rotating metrics CSV writer. Splits into numbered files
/// (`metrics_000.csv`, `metrics_001.csv`, ...) after `max_rows` rows each.
pub struct MetricsFileWriter {
    run_dir: std::path::PathBuf,
    file_index: u32,
    rows_in_current_file: usize,
    max_rows: usize,
    writer: std::io::BufWriter<std::fs::File>,
}

impl MetricsFileWriter {
    /// Create a new writer, opening the first CSV file with a header row.
    pub fn new(run_dir: std::path::PathBuf) -> std::io::Result<Self> {
        Self::with_max_rows(run_dir, MAX_ROWS_PER_FILE)
    }

    pub fn with_max_rows(run_dir: std::path::PathBuf, max_rows: usize) -> std::io::Result<Self> {
        let writer = open_csv_file(&run_dir, 0)?;
        Ok(Self {
            run_dir,
            file_index: 0,
            rows_in_current_file: 0,
            max_rows: max_rows.max(1),
            writer,
        })
    }

    /// Append one snapshot row, rotating to a new file if the current one is full.
    pub fn write_row(&mut self, snapshot: &MetricsSnapshot) -> std::io::Result<()> {
        if self.rows_in_current_file >= self.max_rows {
            self.writer.flush()?;
            self.file_index += 1;
            self.writer = open_csv_file(&self.run_dir, self.file_index)?;
            self.rows_in_current_file = 0;
        }
        append_metrics_row(&mut self.writer, snapshot)?;
        self.rows_in_current_file += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

fn open_csv_file(
    run_dir: &std::path::Path,
    index: u32,
) -> std::io::Result<std::io::BufWriter<std::fs::File>> {
    let path = run_dir.join(format!("metrics_{index:03}.csv"));
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    write_metrics_header(&mut writer)?;
    Ok(writer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use weather_core::MetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub run_schema_version: u32,
    pub run_status: String,
    pub run_id: String,
    pub git_sha: String,
    pub git_dirty: bool,
    pub seed: u64,
    pub scenario_name: String,
    pub scenario_params: serde_json::Value,
    pub tick_start: u64,
    pub tick_end: u64,
    pub total_ticks: u64,
    pub wall_time_ms: u64,
    pub sim_ticks_per_second: f64,
    pub summary_metrics: Option<SummaryMetrics>,
    pub occupancy: BTreeMap<String, f64>,
    /// Regions that never got dynamic weather, as `region: reason`.
    pub init_faults: Vec<String>,
    pub faults_total: u64,
    pub stalled: bool,
    pub stall_reason: Option<String>,
    pub metrics_path: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryMetrics {
    pub regions_total: u32,
    pub regions_clear: u32,
    pub regions_active: u32,
    pub regions_uninitialized: u32,
    pub transitions_total: u64,
    pub active_fraction: f64,
    pub weather_counts: BTreeMap<String, u32>,
}

impl SummaryMetrics {
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        Self {
            regions_total: snapshot.regions_total,
            regions_clear: snapshot.regions_clear,
            regions_active: snapshot.regions_active,
            regions_uninitialized: snapshot.regions_uninitialized,
            transitions_total: snapshot.transitions_total,
            active_fraction: snapshot.active_fraction(),
            weather_counts: snapshot.weather_counts.clone(),
        }
    }
}

impl RunResult {
    /// Write JSON atomically: write to `.tmp` then rename.
    pub fn write_atomic(&self, path: &Path) -> anyhow::Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// A run stalls when it has running regions but none ever changed weather.
pub fn detect_stall(snapshot: &MetricsSnapshot) -> (bool, Option<String>) {
    let running = snapshot.regions_total - snapshot.regions_uninitialized;
    if snapshot.tick > 0 && running > 0 && snapshot.transitions_total == 0 {
        (true, Some("no weather transitions".to_string()))
    } else {
        (false, None)
    }
}

pub fn git_sha() -> String {
    env!("GIT_SHA").to_string()
}

pub fn git_dirty() -> bool {
    env!("GIT_DIRTY") == "true"
}

use crate::run_result::{self, RunResult, SummaryMetrics};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use uuid::Uuid;
use weather_core::{
    EventLevel, MetricsSnapshot, RngSource, SchedulerRegistry, WeatherBoard, WeatherContent,
    WeatherId, WeatherState,
};

/// Per-run settings shared by every seed of a scenario.
pub struct RunSpec<'a> {
    pub ticks: u64,
    pub tick_secs: u64,
    pub metrics_every: u64,
    pub scenario_name: &'a str,
    pub scenario_params: &'a serde_json::Value,
}

pub struct SeedResult {
    pub seed: u64,
    pub run_id: String,
    pub final_snapshot: MetricsSnapshot,
    /// Share of observed region-ticks spent in each `Scheduler/Weather`.
    pub occupancy: BTreeMap<String, f64>,
    pub faults_total: u64,
}

/// `Scheduler/Weather` key used in occupancy tables.
pub fn occupancy_key(scheduler: &str, weather: &str) -> String {
    format!("{scheduler}/{weather}")
}

/// Tallies the weather of every initialized region once per tick.
#[derive(Default)]
struct OccupancyCounter {
    counts: BTreeMap<String, u64>,
    observations: u64,
}

impl OccupancyCounter {
    fn observe(&mut self, state: &WeatherState, content: &WeatherContent) {
        let clear = content.constants.clear_state.as_str();
        for region in state.regions.values().filter(|r| r.initialized) {
            let weather = region.current.as_ref().map_or(clear, WeatherId::as_str);
            *self
                .counts
                .entry(occupancy_key(region.scheduler.as_str(), weather))
                .or_insert(0) += 1;
            self.observations += 1;
        }
    }

    fn shares(&self) -> BTreeMap<String, f64> {
        if self.observations == 0 {
            return BTreeMap::new();
        }
        let total = self.observations as f64;
        self.counts
            .iter()
            .map(|(key, &count)| (key.clone(), count as f64 / total))
            .collect()
    }
}

pub fn run_seed(
    content: &WeatherContent,
    registry: &SchedulerRegistry,
    seed: u64,
    spec: &RunSpec<'_>,
    seed_dir: &Path,
) -> Result<SeedResult> {
    let run_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    let mut source = RngSource(ChaCha8Rng::seed_from_u64(seed));
    let mut board = WeatherBoard::new();
    let (mut state, init_faults) =
        weather_world::build_initial_state(content, registry, seed, &mut source, &mut board);

    std::fs::create_dir_all(seed_dir)
        .with_context(|| format!("creating seed directory: {}", seed_dir.display()))?;

    weather_world::write_run_info(
        seed_dir,
        &format!("seed_{seed}"),
        seed,
        &content.content_version,
        "weather_bench",
        serde_json::json!({
            "ticks": spec.ticks,
            "tick_secs": spec.tick_secs,
            "metrics_every": spec.metrics_every,
        }),
    )?;

    let mut metrics_writer = weather_core::MetricsFileWriter::new(seed_dir.to_path_buf())
        .with_context(|| format!("opening metrics CSV in {}", seed_dir.display()))?;

    let mut occupancy = OccupancyCounter::default();
    let mut faults_total = init_faults.len() as u64;

    for _ in 0..spec.ticks {
        let now = Duration::from_secs(state.meta.tick.saturating_mul(spec.tick_secs));
        let outcome = weather_core::tick(
            &mut state,
            registry,
            &content.constants,
            &mut board,
            &mut source,
            now,
            EventLevel::Normal,
        );
        faults_total += outcome.faults.len() as u64;
        occupancy.observe(&state, content);

        if state.meta.tick % spec.metrics_every == 0 {
            let snapshot = weather_core::compute_metrics(&state);
            metrics_writer
                .write_row(&snapshot)
                .context("writing metrics row")?;
        }
    }

    let final_snapshot = weather_core::compute_metrics(&state);
    if state.meta.tick % spec.metrics_every != 0 {
        metrics_writer
            .write_row(&final_snapshot)
            .context("writing final metrics row")?;
    }
    metrics_writer.flush().context("flushing metrics")?;

    let wall_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let sim_ticks_per_second = if wall_time_ms > 0 {
        spec.ticks as f64 / (wall_time_ms as f64 / 1000.0)
    } else {
        0.0
    };

    let occupancy = occupancy.shares();
    let (stalled, stall_reason) = run_result::detect_stall(&final_snapshot);

    let run_result = RunResult {
        run_schema_version: 1,
        run_status: "completed".to_string(),
        run_id: run_id.clone(),
        git_sha: run_result::git_sha(),
        git_dirty: run_result::git_dirty(),
        seed,
        scenario_name: spec.scenario_name.to_string(),
        scenario_params: spec.scenario_params.clone(),
        tick_start: 0,
        tick_end: state.meta.tick,
        total_ticks: spec.ticks,
        wall_time_ms,
        sim_ticks_per_second,
        summary_metrics: Some(SummaryMetrics::from_snapshot(&final_snapshot)),
        occupancy: occupancy.clone(),
        init_faults: init_faults
            .iter()
            .map(|fault| format!("{}: {}", fault.region, fault.error))
            .collect(),
        faults_total,
        stalled,
        stall_reason,
        metrics_path: "metrics_000.csv".to_string(),
        error_message: None,
    };

    run_result
        .write_atomic(&seed_dir.join("run_result.json"))
        .context("writing run_result.json")?;

    Ok(SeedResult {
        seed,
        run_id,
        final_snapshot,
        occupancy,
        faults_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shipped() -> (WeatherContent, SchedulerRegistry) {
        let content = weather_world::load_content("../../content").unwrap();
        let registry = weather_world::build_registry(&content).unwrap();
        (content, registry)
    }

    fn spec(params: &serde_json::Value) -> RunSpec<'_> {
        RunSpec {
            ticks: 240,
            tick_secs: 60,
            metrics_every: 60,
            scenario_name: "test_scenario",
            scenario_params: params,
        }
    }

    #[test]
    fn test_run_seed_produces_output() {
        let (content, registry) = shipped();
        let temp_dir = TempDir::new().unwrap();
        let seed_dir = temp_dir.path().join("seed_42");
        let params = serde_json::json!({"ticks": 240});

        let result = run_seed(&content, &registry, 42, &spec(&params), &seed_dir).unwrap();

        assert_eq!(result.seed, 42);
        assert_eq!(result.final_snapshot.tick, 240);
        assert_eq!(result.faults_total, 0);
        assert!(!result.run_id.is_empty());
        assert!(seed_dir.join("run_info.json").exists());
        assert!(seed_dir.join("metrics_000.csv").exists());

        let text = std::fs::read_to_string(seed_dir.join("run_result.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["run_schema_version"], 1);
        assert_eq!(parsed["run_status"], "completed");
        assert_eq!(parsed["seed"], 42);
        assert_eq!(parsed["tick_end"], 240);
        assert!(parsed["summary_metrics"].is_object());
        assert!(parsed["occupancy"].is_object());
    }

    #[test]
    fn test_occupancy_shares_sum_to_one() {
        let (content, registry) = shipped();
        let temp_dir = TempDir::new().unwrap();
        let params = serde_json::json!({});

        let result = run_seed(
            &content,
            &registry,
            7,
            &spec(&params),
            &temp_dir.path().join("seed_7"),
        )
        .unwrap();

        let total: f64 = result.occupancy.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(result.occupancy.keys().all(|key| key.contains('/')));
    }

    #[test]
    fn test_run_seed_determinism() {
        let (content, registry) = shipped();
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();
        let params = serde_json::json!({});

        let result1 = run_seed(
            &content,
            &registry,
            42,
            &spec(&params),
            &dir1.path().join("seed_42"),
        )
        .unwrap();
        let result2 = run_seed(
            &content,
            &registry,
            42,
            &spec(&params),
            &dir2.path().join("seed_42"),
        )
        .unwrap();

        assert_eq!(
            result1.final_snapshot.transitions_total,
            result2.final_snapshot.transitions_total
        );
        assert_eq!(
            result1.final_snapshot.weather_counts,
            result2.final_snapshot.weather_counts
        );
        assert_eq!(result1.occupancy, result2.occupancy);
    }
}

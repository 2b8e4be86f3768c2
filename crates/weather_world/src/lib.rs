//! Content loading and world setup shared between weather_cli, weather_daemon
//! and weather_bench.

use anyhow::{bail, Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use weather_core::{
    attach_region, initialize_all, validate_scheduler, Constants, Counters, MetaState,
    RegionConfig, RegionFault, RegionId, RngSource, SchedulerDef, SchedulerId,
    SchedulerRegistry, UniformSource, WeatherContent, WeatherRenderer, WeatherState,
};

/// Bump when `WeatherState` changes shape.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Deserialize)]
struct SchedulersFile {
    content_version: String,
    schedulers: Vec<SchedulerDef>,
}

#[derive(Deserialize)]
struct RegionsFile {
    regions: Vec<RegionConfig>,
}

/// Every authoring problem in `content`, one message each. Empty means valid.
///
/// Catches mistakes like: a transition table with no entries, a weight that
/// is negative, two schedulers with the same name, or a region pointing at a
/// scheduler that doesn't exist.
pub fn content_issues(content: &WeatherContent) -> Vec<String> {
    let mut issues = Vec::new();
    let c = &content.constants;

    if c.clear_state.as_str().is_empty() {
        issues.push("constants: clear_state must not be empty".to_string());
    }
    if c.default_step_frequency_secs == 0 {
        issues.push("constants: default_step_frequency_secs must be positive".to_string());
    }

    // Scheduler definitions.
    let mut scheduler_ids: HashSet<&SchedulerId> = HashSet::new();
    for def in &content.schedulers {
        if !scheduler_ids.insert(&def.id) {
            issues.push(format!("scheduler '{}' is defined more than once", def.id));
        }
        issues.extend(
            validate_scheduler(def, &c.clear_state)
                .iter()
                .map(ToString::to_string),
        );
    }

    // Region attachments.
    let mut region_ids: HashSet<&RegionId> = HashSet::new();
    for region in &content.regions {
        if region.id.as_str().is_empty() {
            issues.push("region with an empty id".to_string());
        }
        if !region_ids.insert(&region.id) {
            issues.push(format!("region '{}' is listed more than once", region.id));
        }
        if !scheduler_ids.contains(&region.scheduler) {
            issues.push(format!(
                "region '{}' references unknown scheduler '{}'",
                region.id, region.scheduler
            ));
        }
        if region.step_frequency_secs == Some(0) {
            issues.push(format!(
                "region '{}' step_frequency_secs must be positive",
                region.id
            ));
        }
    }

    issues
}

/// Validates loaded content, failing with every issue listed.
pub fn validate_content(content: &WeatherContent) -> Result<()> {
    let issues = content_issues(content);
    if issues.is_empty() {
        return Ok(());
    }
    bail!(
        "content has {} issue(s):\n  - {}",
        issues.len(),
        issues.join("\n  - ")
    )
}

/// Reads `constants.json`, `schedulers.json` and `regions.json` without
/// validating them.
pub fn read_content(content_dir: &str) -> Result<WeatherContent> {
    let dir = Path::new(content_dir);
    let constants: Constants = serde_json::from_str(
        &std::fs::read_to_string(dir.join("constants.json")).context("reading constants.json")?,
    )
    .context("parsing constants.json")?;
    let schedulers_file: SchedulersFile = serde_json::from_str(
        &std::fs::read_to_string(dir.join("schedulers.json"))
            .context("reading schedulers.json")?,
    )
    .context("parsing schedulers.json")?;
    let regions_file: RegionsFile = serde_json::from_str(
        &std::fs::read_to_string(dir.join("regions.json")).context("reading regions.json")?,
    )
    .context("parsing regions.json")?;
    Ok(WeatherContent {
        content_version: schedulers_file.content_version,
        schedulers: schedulers_file.schedulers,
        regions: regions_file.regions,
        constants,
    })
}

pub fn load_content(content_dir: &str) -> Result<WeatherContent> {
    let content = read_content(content_dir)?;
    validate_content(&content).with_context(|| format!("validating content in {content_dir}"))?;
    Ok(content)
}

/// Registry of the content's schedulers. Fails if any definition is rejected.
pub fn build_registry(content: &WeatherContent) -> Result<SchedulerRegistry> {
    let (registry, rejected) =
        SchedulerRegistry::load(content.schedulers.clone(), &content.constants.clear_state);
    if !rejected.is_empty() {
        let messages: Vec<String> = rejected.iter().map(ToString::to_string).collect();
        bail!("rejected schedulers:\n  - {}", messages.join("\n  - "));
    }
    Ok(registry)
}

/// Fresh world at time zero: every content region attached and initialized.
///
/// Regions whose scheduler cannot be resolved stay attached without weather
/// and are returned as faults.
pub fn build_initial_state(
    content: &WeatherContent,
    registry: &SchedulerRegistry,
    seed: u64,
    source: &mut impl UniformSource,
    renderer: &mut impl WeatherRenderer,
) -> (WeatherState, Vec<RegionFault>) {
    let mut state = WeatherState {
        meta: MetaState {
            tick: 0,
            seed,
            schema_version: SCHEMA_VERSION,
            content_version: content.content_version.clone(),
            now: Duration::ZERO,
        },
        regions: std::collections::HashMap::new(),
        counters: Counters {
            next_event_id: 0,
            transitions_total: 0,
        },
    };
    for config in &content.regions {
        attach_region(&mut state, config, &content.constants, Duration::ZERO);
    }
    let faults = initialize_all(&mut state, registry, &content.constants, renderer, source);
    (state, faults)
}

/// Loads a saved `WeatherState` and checks it was written for this content.
pub fn load_state(path: &str, content: &WeatherContent) -> Result<WeatherState> {
    let json =
        std::fs::read_to_string(path).with_context(|| format!("reading state file: {path}"))?;
    let state: WeatherState =
        serde_json::from_str(&json).with_context(|| format!("parsing state file: {path}"))?;
    if state.meta.schema_version != SCHEMA_VERSION {
        bail!(
            "state file {path} has schema version {}, expected {SCHEMA_VERSION}",
            state.meta.schema_version
        );
    }
    if state.meta.content_version != content.content_version {
        bail!(
            "state file {path} was written for content {}, loaded content is {}",
            state.meta.content_version,
            content.content_version
        );
    }
    Ok(state)
}

/// Random source for a run starting at `tick`. A resumed run draws from the
/// ChaCha stream numbered by its resume tick, so it doesn't replay the draws
/// of the original run. A fresh world is tick 0.
pub fn resume_source(seed: u64, tick: u64) -> RngSource<ChaCha8Rng> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(tick);
    RngSource(rng)
}

/// Explicit seed, or a random one.
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(rand::random)
}

/// `YYYYMMDD_HHMMSS_seedN`, in UTC.
pub fn generate_run_id(seed: u64) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    format!("{timestamp}_seed{seed}")
}

/// `runs/<run_id>`, created if missing.
pub fn create_run_dir(run_id: &str) -> Result<std::path::PathBuf> {
    let dir = std::path::PathBuf::from("runs").join(run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating run directory: {}", dir.display()))?;
    Ok(dir)
}

pub fn write_run_info(
    dir: &Path,
    run_id: &str,
    seed: u64,
    content_version: &str,
    runner: &str,
    args: serde_json::Value,
) -> Result<()> {
    let info = serde_json::json!({
        "run_id": run_id,
        "seed": seed,
        "start_time": chrono::Utc::now().to_rfc3339(),
        "content_version": content_version,
        "runner": runner,
        "args": args,
    });
    let path = dir.join("run_info.json");
    let file =
        std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &info)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

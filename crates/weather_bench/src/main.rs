use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use weather_core::{SchedulerRegistry, WeatherContent};

mod overrides;
mod run_result;
mod runner;
mod scenario;
mod summary;

/// Power-iteration budget for the expected occupancy column.
const STATIONARY_ITERATIONS: u32 = 100_000;

#[derive(Parser)]
#[command(
    name = "weather_bench",
    about = "Runs weather scenarios across many seeds to tune transition weights"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file across multiple seeds.
    Run {
        /// Path to the scenario JSON file.
        #[arg(long)]
        scenario: String,
        /// Output directory (default: runs/).
        #[arg(long, default_value = "runs")]
        output_dir: String,
    },
}

/// Stationary share of every state of every scheduler a region uses, keyed
/// like the per-seed occupancy tables.
fn expected_occupancy(
    content: &WeatherContent,
    registry: &SchedulerRegistry,
) -> BTreeMap<String, f64> {
    let used: HashSet<_> = content.regions.iter().map(|r| &r.scheduler).collect();
    registry
        .iter()
        .filter(|def| used.contains(&def.id))
        .flat_map(|def| {
            weather_core::stationary_distribution(def, &content.constants, STATIONARY_ITERATIONS)
                .into_iter()
                .map(move |(state, share)| {
                    (runner::occupancy_key(def.id.as_str(), state.as_str()), share)
                })
        })
        .collect()
}

fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value).context("serializing batch summary")?;
    let mut file =
        std::fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    file.write_all(json.as_bytes())
        .context("writing batch summary")?;
    file.sync_all()?;
    std::fs::rename(&tmp, path).context("renaming batch summary")?;
    Ok(())
}

fn run(scenario_path: &str, output_dir: &str) -> Result<()> {
    let scenario = scenario::load_scenario(Path::new(scenario_path))?;
    let seeds = scenario.seeds.expand();

    println!(
        "Loading scenario '{}': {} seeds × {} ticks",
        scenario.name,
        seeds.len(),
        scenario.ticks
    );

    // Overrides go in before validation so a bad override fails loudly.
    let mut content = weather_world::read_content(&scenario.content_dir)?;
    overrides::apply_overrides(&mut content, &scenario.overrides)?;
    weather_world::validate_content(&content).context("content invalid after overrides")?;
    let registry = weather_world::build_registry(&content)?;
    let expected = expected_occupancy(&content, &registry);

    let scenario_params = serde_json::json!({
        "ticks": scenario.ticks,
        "tick_secs": scenario.tick_secs,
        "metrics_every": scenario.metrics_every,
        "content_dir": scenario.content_dir,
        "overrides": scenario.overrides,
    });

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_dir = PathBuf::from(output_dir).join(format!("{}_{}", scenario.name, timestamp));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating output directory: {}", run_dir.display()))?;
    std::fs::copy(scenario_path, run_dir.join("scenario.json")).context("copying scenario file")?;

    println!("Output: {}", run_dir.display());
    println!("Running {} seeds in parallel...", seeds.len());

    let spec = runner::RunSpec {
        ticks: scenario.ticks,
        tick_secs: scenario.tick_secs,
        metrics_every: scenario.metrics_every,
        scenario_name: &scenario.name,
        scenario_params: &scenario_params,
    };
    let results: Vec<Result<runner::SeedResult>> = seeds
        .par_iter()
        .map(|&seed| {
            let seed_dir = run_dir.join(format!("seed_{seed}"));
            runner::run_seed(&content, &registry, seed, &spec, &seed_dir)
        })
        .collect();

    let mut seed_results = Vec::new();
    for result in results {
        match result {
            Ok(seed_result) => seed_results.push(seed_result),
            Err(err) => eprintln!("Seed failed: {err:#}"),
        }
    }
    if seed_results.is_empty() {
        anyhow::bail!("all seeds failed");
    }

    let views: Vec<summary::SeedView<'_>> = seed_results
        .iter()
        .map(|r| summary::SeedView {
            snapshot: &r.final_snapshot,
            occupancy: &r.occupancy,
            stalled: run_result::detect_stall(&r.final_snapshot).0,
        })
        .collect();
    let stats = summary::compute_summary(&views, &expected);
    summary::print_summary(&scenario.name, scenario.ticks, &stats);

    let faults_total: u64 = seed_results.iter().map(|r| r.faults_total).sum();
    if faults_total > 0 {
        println!("WARNING: {faults_total} region faults across all seeds (see run_result.json)");
    }

    let summary_path = run_dir.join("summary.json");
    let summary_json = serde_json::to_string_pretty(&stats).context("serializing summary")?;
    std::fs::write(&summary_path, summary_json)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    let run_ids: Vec<&str> = seed_results.iter().map(|r| r.run_id.as_str()).collect();
    let seeds_run: Vec<u64> = seed_results.iter().map(|r| r.seed).collect();
    let batch_summary = serde_json::json!({
        "batch_schema_version": 1,
        "batch_id": Uuid::new_v4().to_string(),
        "scenario_name": scenario.name,
        "scenario_params": scenario_params,
        "seed_count": seed_results.len(),
        "seeds": seeds_run,
        "run_ids": run_ids,
        "stalled_count": stats.stalled_count,
        "faults_total": faults_total,
        "aggregated_metrics": summary::build_aggregated_metrics(&stats),
    });
    let batch_path = run_dir.join("batch_summary.json");
    write_json_atomic(&batch_path, &batch_summary)?;

    println!("Summary written to {}", summary_path.display());
    println!("Batch summary written to {}", batch_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            scenario,
            output_dir,
        } => run(&scenario, &output_dir)?,
    }
    Ok(())
}

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use weather_core::{
    mean_dwell_steps, stationary_distribution, Event, EventEnvelope, EventLevel,
    MetricsFileWriter, RegionFault, RngSource, SchedulerId, SchedulerRegistry, WeatherBoard,
    WeatherContent, WeatherId, WeatherState,
};
use weather_world::{
    build_initial_state, build_registry, content_issues, create_run_dir, generate_run_id,
    load_content, load_state, read_content, resolve_seed, resume_source, write_run_info,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "weather_cli", about = "Stochastic weather scheduler CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler for a fixed number of ticks.
    Run(RunArgs),
    /// Check a content directory and list every authoring problem.
    Validate {
        #[arg(long, default_value = "./content")]
        content_dir: String,
    },
    /// Print the long-run weather occupancy of each scheduler.
    Inspect {
        #[arg(long, default_value = "./content")]
        content_dir: String,
        /// Only this scheduler.
        #[arg(long)]
        scheduler: Option<String>,
        #[arg(long, default_value_t = 100_000)]
        iterations: u32,
        /// Print the report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    ticks: u64,
    /// Build a fresh world with this seed. Mutually exclusive with --state.
    #[arg(long, conflicts_with = "state_file")]
    seed: Option<u64>,
    /// Resume from a saved WeatherState JSON file. Mutually exclusive with --seed.
    #[arg(long = "state", conflicts_with = "seed")]
    state_file: Option<String>,
    /// Write the final WeatherState to this file.
    #[arg(long)]
    save: Option<String>,
    #[arg(long, default_value = "./content")]
    content_dir: String,
    /// Simulated seconds per tick.
    #[arg(long, default_value_t = 60)]
    tick_secs: u64,
    #[arg(long, default_value_t = 60)]
    print_every: u64,
    #[arg(long, default_value = "normal", value_parser = ["normal", "debug"])]
    event_level: String,
    /// Sample metrics every N ticks (default 60).
    #[arg(long, default_value_t = 60)]
    metrics_every: u64,
    /// Disable automatic metrics collection to runs/ directory.
    #[arg(long)]
    no_metrics: bool,
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

fn log_faults(faults: &[RegionFault]) {
    for fault in faults {
        tracing::warn!(
            region = %fault.region,
            error = %fault.error,
            "region has no dynamic weather"
        );
    }
}

/// Fresh world from `--seed`, or the saved state from `--state` with its
/// weather re-applied.
fn setup_world(
    args: &RunArgs,
    content: &WeatherContent,
    registry: &SchedulerRegistry,
    board: &mut WeatherBoard,
) -> Result<(WeatherState, RngSource<ChaCha8Rng>)> {
    if let Some(path) = &args.state_file {
        let mut loaded = load_state(path, content)?;
        let mut source = resume_source(loaded.meta.seed, loaded.meta.tick);
        let faults = weather_core::initialize_all(
            &mut loaded,
            registry,
            &content.constants,
            board,
            &mut source,
        );
        log_faults(&faults);
        tracing::info!(path = %path, tick = loaded.meta.tick, "resumed saved state");
        return Ok((loaded, source));
    }
    let seed = resolve_seed(args.seed);
    let mut source = resume_source(seed, 0);
    let (state, faults) = build_initial_state(content, registry, seed, &mut source, board);
    log_faults(&faults);
    Ok((state, source))
}

fn open_metrics(
    args: &RunArgs,
    state: &WeatherState,
    content: &WeatherContent,
) -> Result<Option<MetricsFileWriter>> {
    if args.no_metrics {
        return Ok(None);
    }
    let run_id = generate_run_id(state.meta.seed);
    let run_dir = create_run_dir(&run_id)?;
    write_run_info(
        &run_dir,
        &run_id,
        state.meta.seed,
        &content.content_version,
        "weather_cli",
        serde_json::json!({
            "ticks": args.ticks,
            "tick_secs": args.tick_secs,
            "print_every": args.print_every,
            "metrics_every": args.metrics_every,
        }),
    )?;
    let writer = MetricsFileWriter::new(run_dir.clone())
        .with_context(|| format!("opening metrics CSV in {}", run_dir.display()))?;
    println!("Run directory: {}", run_dir.display());
    Ok(Some(writer))
}

fn log_events(events: &[EventEnvelope]) {
    for envelope in events {
        match &envelope.event {
            Event::WeatherTransition {
                region,
                previous,
                next,
            } => tracing::debug!(
                %region,
                previous = %label(previous.as_ref()),
                next = %label(next.as_ref()),
                tick = envelope.tick,
                "weather changed"
            ),
            Event::WeatherRoll {
                region,
                from,
                drawn,
                rolled,
                total_weight,
            } => tracing::trace!(%region, %from, %drawn, rolled, total_weight, "weather roll"),
        }
    }
}

fn run(args: &RunArgs) -> Result<()> {
    let content = load_content(&args.content_dir)?;
    let registry = build_registry(&content)?;
    let event_level = match args.event_level.as_str() {
        "debug" => EventLevel::Debug,
        _ => EventLevel::Normal,
    };
    if args.tick_secs == 0 {
        bail!("--tick-secs must be positive");
    }
    let print_every = args.print_every.max(1);
    let metrics_every = args.metrics_every.max(1);

    let mut board = WeatherBoard::new();
    let (mut state, mut source) = setup_world(args, &content, &registry, &mut board)?;
    let mut metrics_writer = open_metrics(args, &state, &content)?;

    println!(
        "Starting weather run: ticks={} seed={} regions={} schedulers={} content_version={}",
        args.ticks,
        state.meta.seed,
        state.regions.len(),
        registry.len(),
        content.content_version,
    );
    println!("{}", "-".repeat(80));

    for _ in 0..args.ticks {
        let now = Duration::from_secs(state.meta.tick * args.tick_secs);
        let outcome = weather_core::tick(
            &mut state,
            &registry,
            &content.constants,
            &mut board,
            &mut source,
            now,
            event_level,
        );
        log_faults(&outcome.faults);
        log_events(&outcome.events);

        if state.meta.tick % print_every == 0 {
            print_status(&state, &board);
        }

        if let Some(ref mut writer) = metrics_writer {
            if state.meta.tick % metrics_every == 0 {
                let snapshot = weather_core::compute_metrics(&state);
                writer.write_row(&snapshot).context("writing metrics row")?;
            }
        }
    }

    println!("{}", "-".repeat(80));
    println!("Done. Final state at tick {}:", state.meta.tick);
    print_status(&state, &board);

    if let Some(ref mut writer) = metrics_writer {
        writer.flush().context("final metrics flush")?;
        println!("Metrics written to runs/ directory.");
    }

    if let Some(path) = &args.save {
        let json = serde_json::to_string_pretty(&state).context("serializing final state")?;
        std::fs::write(path, json).with_context(|| format!("writing state file: {path}"))?;
        println!("State saved to {path}");
    }

    Ok(())
}

fn label(weather: Option<&WeatherId>) -> &str {
    weather.map_or("clear", WeatherId::as_str)
}

fn print_status(state: &WeatherState, board: &WeatherBoard) {
    let tick = state.meta.tick;
    let secs = state.meta.now.as_secs();
    let day = secs / 86_400;
    let hour = (secs % 86_400) / 3600;

    let metrics = weather_core::compute_metrics(state);
    let visible: Vec<String> = board
        .visible_all(state.meta.now)
        .into_iter()
        .map(|(region, weather)| format!("{region}: {}", label(weather.as_ref())))
        .collect();

    println!(
        "[tick={tick:05}  day={day}  hour={hour:02}]  \
         clear={clear:2}  active={active:2}  transitions={transitions:4}  [{visible}]",
        clear = metrics.regions_clear,
        active = metrics.regions_active,
        transitions = metrics.transitions_total,
        visible = visible.join(", "),
    );
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

fn validate(content_dir: &str) -> Result<()> {
    let content = read_content(content_dir)?;
    let issues = content_issues(&content);
    if !issues.is_empty() {
        for issue in &issues {
            println!("  ✗ {issue}");
        }
        bail!("{} issue(s) in {content_dir}", issues.len());
    }
    println!(
        "Content OK: version={} schedulers={} regions={}",
        content.content_version,
        content.schedulers.len(),
        content.regions.len(),
    );
    for region in &content.regions {
        let step = region
            .step_frequency_secs
            .unwrap_or(content.constants.default_step_frequency_secs);
        println!(
            "  ✓ {:<20} scheduler={:<12} step={step}s warm_up={}",
            region.id.as_str(),
            region.scheduler.as_str(),
            region.random_initial_state,
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Inspect
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct StateReport {
    state: String,
    share: f64,
    /// Expected consecutive minutes once entered, at the default step frequency.
    mean_dwell_minutes: Option<f64>,
}

#[derive(Serialize)]
struct SchedulerReport {
    scheduler: String,
    states: Vec<StateReport>,
}

fn inspect(content_dir: &str, only: Option<&str>, iterations: u32, json: bool) -> Result<()> {
    let content = load_content(content_dir)?;
    let registry = build_registry(&content)?;
    let step_minutes = content.constants.default_step_frequency().as_secs_f64() / 60.0;

    let defs: Vec<_> = match only {
        Some(name) => vec![registry.lookup(&SchedulerId::new(name))?],
        None => registry.iter().collect(),
    };

    let reports: Vec<SchedulerReport> = defs
        .into_iter()
        .map(|def| SchedulerReport {
            scheduler: def.id.to_string(),
            states: stationary_distribution(def, &content.constants, iterations)
                .into_iter()
                .map(|(state, share)| StateReport {
                    mean_dwell_minutes: mean_dwell_steps(def, &state)
                        .map(|steps| steps * step_minutes),
                    state: state.to_string(),
                    share,
                })
                .collect(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for report in &reports {
        println!("{}", report.scheduler);
        for state in &report.states {
            let dwell = state
                .mean_dwell_minutes
                .map_or_else(|| "-".to_string(), |m| format!("{m:.0} min"));
            println!("  {:<20} {:>6.2}%  dwell {dwell}", state.state, state.share * 100.0);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(&args)?,
        Commands::Validate { content_dir } => validate(&content_dir)?,
        Commands::Inspect {
            content_dir,
            scheduler,
            iterations,
            json,
        } => inspect(&content_dir, scheduler.as_deref(), iterations, json)?,
    }
    Ok(())
}

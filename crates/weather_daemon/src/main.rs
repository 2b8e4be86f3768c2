mod routes;
mod state;
mod tick_loop;

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use parking_lot::Mutex;
use weather_core::{EventLevel, WeatherBoard};
use weather_world::{
    build_initial_state, build_registry, create_run_dir, generate_run_id, load_content,
    load_state, resolve_seed, resume_source, write_run_info,
};

use crate::state::{AppState, SimState};

#[derive(Parser)]
#[command(name = "weather_daemon", about = "Weather scheduler daemon with HTTP API")]
struct Cli {
    #[arg(long, default_value = "./content")]
    content_dir: String,
    /// Build a fresh world with this seed. Mutually exclusive with --state.
    #[arg(long, conflicts_with = "state_file")]
    seed: Option<u64>,
    /// Resume from a saved WeatherState JSON file.
    #[arg(long = "state", conflicts_with = "seed")]
    state_file: Option<String>,
    #[arg(long, default_value_t = 3001)]
    port: u16,
    /// Wall-clock tick rate. 0 runs as fast as possible.
    #[arg(long, default_value_t = 10.0)]
    ticks_per_sec: f64,
    /// Simulated seconds per tick.
    #[arg(long, default_value_t = 60)]
    tick_secs: u64,
    /// Stop after this many ticks (runs forever if omitted).
    #[arg(long)]
    max_ticks: Option<u64>,
    #[arg(long, default_value_t = 60)]
    metrics_every: u64,
    /// Disable the runs/ directory (and with it /api/v1/save).
    #[arg(long)]
    no_metrics: bool,
    #[arg(long, default_value = "normal", value_parser = ["normal", "debug"])]
    event_level: String,
    #[arg(long, default_value = "http://localhost:5173")]
    cors_origin: String,
}

fn build_sim(cli: &Cli) -> Result<SimState> {
    let content = load_content(&cli.content_dir)?;
    let registry = build_registry(&content)?;
    let mut board = WeatherBoard::new();

    let (weather, source, faults) = if let Some(path) = &cli.state_file {
        let mut weather = load_state(path, &content)?;
        let mut source = resume_source(weather.meta.seed, weather.meta.tick);
        let faults = weather_core::initialize_all(
            &mut weather,
            &registry,
            &content.constants,
            &mut board,
            &mut source,
        );
        (weather, source, faults)
    } else {
        let seed = resolve_seed(cli.seed);
        let mut source = resume_source(seed, 0);
        let (weather, faults) =
            build_initial_state(&content, &registry, seed, &mut source, &mut board);
        (weather, source, faults)
    };
    for fault in &faults {
        tracing::warn!(
            region = %fault.region,
            error = %fault.error,
            "region has no dynamic weather"
        );
    }

    Ok(SimState {
        weather,
        content,
        registry,
        source,
        board,
        event_level: match cli.event_level.as_str() {
            "debug" => EventLevel::Debug,
            _ => EventLevel::Normal,
        },
        tick_secs: cli.tick_secs.max(1),
        metrics_every: cli.metrics_every,
        metrics_history: VecDeque::new(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let sim = build_sim(&cli)?;
    let cors_origin: HeaderValue = cli
        .cors_origin
        .parse()
        .with_context(|| format!("invalid --cors-origin: {}", cli.cors_origin))?;

    let run_dir = if cli.no_metrics {
        None
    } else {
        let run_id = generate_run_id(sim.weather.meta.seed);
        let dir = create_run_dir(&run_id)?;
        write_run_info(
            &dir,
            &run_id,
            sim.weather.meta.seed,
            &sim.content.content_version,
            "weather_daemon",
            serde_json::json!({
                "ticks_per_sec": cli.ticks_per_sec,
                "tick_secs": cli.tick_secs,
                "max_ticks": cli.max_ticks,
                "metrics_every": cli.metrics_every,
            }),
        )?;
        Some(dir)
    };

    tracing::info!(
        seed = sim.weather.meta.seed,
        tick = sim.weather.meta.tick,
        regions = sim.weather.regions.len(),
        schedulers = sim.registry.len(),
        content_version = %sim.content.content_version,
        "weather daemon starting"
    );

    let (event_tx, _) = tokio::sync::broadcast::channel(256);
    let app_state = AppState {
        sim: Arc::new(Mutex::new(sim)),
        event_tx,
        ticks_per_sec: cli.ticks_per_sec,
        paused: Arc::new(AtomicBool::new(false)),
        run_dir,
    };

    tokio::spawn(tick_loop::run_tick_loop(
        app_state.sim.clone(),
        app_state.event_tx.clone(),
        cli.ticks_per_sec,
        cli.max_ticks,
        app_state.paused.clone(),
    ));

    let app = routes::make_router_with_cors(app_state, cors_origin);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port))
        .await
        .with_context(|| format!("binding port {}", cli.port))?;
    tracing::info!(port = cli.port, "listening");
    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}

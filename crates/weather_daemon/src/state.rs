use parking_lot::Mutex;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use weather_core::{
    EventEnvelope, EventLevel, MetricsSnapshot, RngSource, SchedulerRegistry, WeatherBoard,
    WeatherContent, WeatherState,
};

/// Metrics samples kept in memory for `/api/v1/metrics`.
pub const METRICS_HISTORY_LEN: usize = 1_000;

pub struct SimState {
    pub weather: WeatherState,
    pub content: WeatherContent,
    pub registry: SchedulerRegistry,
    pub source: RngSource<ChaCha8Rng>,
    pub board: WeatherBoard,
    pub event_level: EventLevel,
    /// Simulated seconds per tick.
    pub tick_secs: u64,
    pub metrics_every: u64,
    pub metrics_history: VecDeque<MetricsSnapshot>,
}

impl SimState {
    /// Simulation time the next tick runs at.
    pub fn next_tick_time(&self) -> Duration {
        Duration::from_secs(self.weather.meta.tick.saturating_mul(self.tick_secs))
    }

    pub fn push_metrics(&mut self, snapshot: MetricsSnapshot) {
        if self.metrics_history.len() >= METRICS_HISTORY_LEN {
            self.metrics_history.pop_front();
        }
        self.metrics_history.push_back(snapshot);
    }
}

pub type SharedSim = Arc<Mutex<SimState>>;
pub type EventTx = broadcast::Sender<Vec<EventEnvelope>>;

#[derive(Clone)]
pub struct AppState {
    pub sim: SharedSim,
    pub event_tx: EventTx,
    pub ticks_per_sec: f64,
    pub paused: Arc<AtomicBool>,
    pub run_dir: Option<PathBuf>,
}

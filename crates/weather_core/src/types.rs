//! Type definitions for `weather_core`.
//!
//! All public types, structs, enums, and ID newtypes used by the scheduler.

use std::collections::HashMap;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(WeatherId);
string_id!(SchedulerId);
string_id!(RegionId);
string_id!(EventId);

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Normal,
    Debug,
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

/// Candidate successor states and their relative weights, in configuration order.
pub type TransitionTable = IndexMap<WeatherId, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherStateDef {
    pub transitions: TransitionTable,
}

/// A named Markov chain over weather states. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerDef {
    pub id: SchedulerId,
    pub states: IndexMap<WeatherId, WeatherStateDef>,
}

/// Per-region attachment record, as authored in `regions.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub id: RegionId,
    pub scheduler: SchedulerId,
    /// Falls back to `Constants::default_step_frequency_secs` when absent.
    #[serde(default)]
    pub step_frequency_secs: Option<u64>,
    #[serde(default = "default_random_initial_state")]
    pub random_initial_state: bool,
}

fn default_random_initial_state() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherContent {
    pub content_version: String,
    pub schedulers: Vec<SchedulerDef>,
    pub regions: Vec<RegionConfig>,
    pub constants: Constants,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constants {
    /// Meta-state standing in for "no active weather".
    pub clear_state: WeatherId,
    pub default_step_frequency_secs: u64,
    /// Warm-up horizon: a typical session length.
    pub max_simulated_duration_secs: u64,
    /// How long the renderer keeps showing weather after its expiry lapses.
    pub shutdown_grace_secs: u64,
}

impl Constants {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn max_simulated_duration(&self) -> Duration {
        Duration::from_secs(self.max_simulated_duration_secs)
    }

    pub fn default_step_frequency(&self) -> Duration {
        Duration::from_secs(self.default_step_frequency_secs)
    }

    pub fn is_clear(&self, weather: &WeatherId) -> bool {
        *weather == self.clear_state
    }
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            clear_state: WeatherId::new("Clear"),
            default_step_frequency_secs: 60,
            max_simulated_duration_secs: 6 * 60 * 60,
            shutdown_grace_secs: 15,
        }
    }
}

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherState {
    pub meta: MetaState,
    pub regions: HashMap<RegionId, RegionWeather>,
    pub counters: Counters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaState {
    pub tick: u64,
    pub seed: u64,
    pub schema_version: u32,
    pub content_version: String,
    /// Simulation clock as of the last tick.
    pub now: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counters {
    pub next_event_id: u64,
    pub transitions_total: u64,
}

/// Chain runner state for one scheduled region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionWeather {
    pub id: RegionId,
    pub scheduler: SchedulerId,
    pub step_frequency: Duration,
    pub random_initial_state: bool,
    /// `None` is Clear. The sentinel id itself is never stored here.
    pub current: Option<WeatherId>,
    pub next_update_at: Duration,
    /// Set once weather has been applied; restored regions skip the warm-up.
    #[serde(default)]
    pub initialized: bool,
}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub tick: u64,
    pub at: Duration,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A region's weather changed. `None` is Clear.
    WeatherTransition {
        region: RegionId,
        previous: Option<WeatherId>,
        next: Option<WeatherId>,
    },
    /// Only emitted at `EventLevel::Debug`.
    WeatherRoll {
        region: RegionId,
        from: WeatherId,
        drawn: WeatherId,
        total_weight: f64,
        rolled: f64,
    },
}

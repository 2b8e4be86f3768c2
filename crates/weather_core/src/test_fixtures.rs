//! Shared test fixtures for weather_core and downstream crates.
//!
//! `snowfall_scheduler()` is the two-state chain used throughout the scenario
//! tests. `base_content()` wraps it with one attached region. `ScriptedDraws`
//! replays recorded draws so chain runs can be pinned exactly.

use std::collections::HashMap;
use std::time::Duration;

use indexmap::IndexMap;

use crate::{
    Constants, Counters, MetaState, RegionConfig, RegionId, SchedulerDef, SchedulerId,
    TransitionTable, UniformSource, WeatherContent, WeatherId, WeatherRenderer, WeatherState,
    WeatherStateDef,
};

/// Replays recorded fractions of the requested range, in order.
///
/// Each call to `uniform(upper)` returns `fraction * upper`. Once the script
/// runs out the last fraction repeats.
#[derive(Debug, Clone)]
pub struct ScriptedDraws {
    fractions: Vec<f64>,
    consumed: usize,
}

impl ScriptedDraws {
    pub fn new(fractions: Vec<f64>) -> Self {
        assert!(!fractions.is_empty(), "scripted draws need at least one fraction");
        Self {
            fractions,
            consumed: 0,
        }
    }

    /// Always lands on the last positively weighted candidate of any table.
    pub fn always_last() -> Self {
        Self::new(vec![0.999_999])
    }

    /// Always lands on the first positively weighted candidate of any table.
    pub fn always_first() -> Self {
        Self::new(vec![0.0])
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl UniformSource for ScriptedDraws {
    fn uniform(&mut self, upper: f64) -> f64 {
        let index = self.consumed.min(self.fractions.len() - 1);
        self.consumed += 1;
        self.fractions[index] * upper
    }
}

/// One recorded `set_weather` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCall {
    pub region: RegionId,
    pub weather: Option<WeatherId>,
    pub expires_at: Duration,
}

/// Renderer that only records what it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
}

impl WeatherRenderer for RecordingRenderer {
    fn set_weather(
        &mut self,
        region: &RegionId,
        weather: Option<&WeatherId>,
        expires_at: Duration,
    ) {
        self.calls.push(RenderCall {
            region: region.clone(),
            weather: weather.cloned(),
            expires_at,
        });
    }
}

pub fn wid(id: &str) -> WeatherId {
    WeatherId::new(id)
}

pub fn rid(id: &str) -> RegionId {
    RegionId::new(id)
}

pub fn table(entries: &[(&str, f64)]) -> TransitionTable {
    entries
        .iter()
        .map(|(id, weight)| (wid(id), *weight))
        .collect()
}

/// Builds a scheduler from `(state, [(target, weight)])` rows, preserving order.
pub fn scheduler(id: &str, rows: &[(&str, &[(&str, f64)])]) -> SchedulerDef {
    let states: IndexMap<WeatherId, WeatherStateDef> = rows
        .iter()
        .map(|(state, transitions)| {
            (
                wid(state),
                WeatherStateDef {
                    transitions: table(transitions),
                },
            )
        })
        .collect();
    SchedulerDef {
        id: SchedulerId::new(id),
        states,
    }
}

/// `{Clear: {Clear: 162, Light: 1}, Light: {Clear: 1, Light: 100}}`
pub fn snowfall_scheduler() -> SchedulerDef {
    scheduler(
        "Snowfall",
        &[
            ("Clear", &[("Clear", 162.0), ("Light", 1.0)]),
            ("Light", &[("Clear", 1.0), ("Light", 100.0)]),
        ],
    )
}

/// Four-state snow chain with a zero-weight transition kept for tuning.
pub fn blizzard_scheduler() -> SchedulerDef {
    scheduler(
        "Blizzard",
        &[
            (
                "Clear",
                &[("Clear", 162.0), ("SnowfallLight", 1.0), ("SnowfallHeavy", 0.0)],
            ),
            (
                "SnowfallLight",
                &[("Clear", 1.0), ("SnowfallLight", 100.0), ("SnowfallMedium", 2.0)],
            ),
            (
                "SnowfallMedium",
                &[("SnowfallLight", 3.0), ("SnowfallMedium", 150.0), ("SnowfallHeavy", 1.0)],
            ),
            (
                "SnowfallHeavy",
                &[("SnowfallLight", 1.0), ("SnowfallMedium", 3.0), ("SnowfallHeavy", 36.0)],
            ),
        ],
    )
}

pub fn region_config(id: &str, scheduler: &str) -> RegionConfig {
    RegionConfig {
        id: rid(id),
        scheduler: SchedulerId::new(scheduler),
        step_frequency_secs: Some(60),
        random_initial_state: false,
    }
}

/// Snowfall and Blizzard schedulers, one region on Snowfall without warm-up.
pub fn base_content() -> WeatherContent {
    WeatherContent {
        content_version: "test".to_string(),
        schedulers: vec![snowfall_scheduler(), blizzard_scheduler()],
        regions: vec![region_config("region_test", "Snowfall")],
        constants: Constants::default(),
    }
}

/// Empty world at time zero; attach regions explicitly.
pub fn empty_state(content: &WeatherContent) -> WeatherState {
    WeatherState {
        meta: MetaState {
            tick: 0,
            seed: 0,
            schema_version: 1,
            content_version: content.content_version.clone(),
            now: Duration::ZERO,
        },
        regions: HashMap::new(),
        counters: Counters {
            next_event_id: 0,
            transitions_total: 0,
        },
    }
}

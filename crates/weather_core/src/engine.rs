use std::collections::hash_map::Entry;
use std::time::Duration;

use crate::sampling::{pick, UniformSource};
use crate::{
    Constants, Event, EventEnvelope, EventLevel, RegionConfig, RegionFault, RegionId,
    RegionWeather, SchedulerDef, SchedulerError, SchedulerRegistry, WeatherId, WeatherRenderer,
    WeatherState,
};

/// What `initialize_region` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// Started from the scheduler's first configured state.
    Fresh,
    /// Ran the chain silently for this many steps first.
    WarmedUp { steps: u64 },
    /// Region was already initialized (e.g. loaded from a save); re-applied as is.
    Restored,
    /// Region was restored in a state its scheduler has no table for, so it
    /// was initialized again from scratch.
    Reset { stale: WeatherId },
    /// Scheduler reference did not resolve. Region has no dynamic weather.
    Unresolved,
}

/// Everything a tick produced.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub events: Vec<EventEnvelope>,
    /// Regions that were due but could not advance. Their clocks still moved.
    pub faults: Vec<RegionFault>,
}

/// One transition step, before it is applied.
#[derive(Debug, Clone)]
pub struct Step {
    /// State the draw was made from (Clear spelled out).
    pub from: WeatherId,
    /// Raw candidate that won the draw.
    pub drawn: WeatherId,
    /// `drawn`, with Clear normalized to `None`.
    pub next: Option<WeatherId>,
    pub total_weight: f64,
    pub rolled: f64,
}

/// Clear is stored as `None`, never as the sentinel id.
pub fn normalize(weather: &WeatherId, constants: &Constants) -> Option<WeatherId> {
    if constants.is_clear(weather) {
        None
    } else {
        Some(weather.clone())
    }
}

/// Draws the successor of `current`, drawing from the Clear table when
/// `current` is `None`. Consumes exactly one draw on success.
pub fn next_state(
    def: &SchedulerDef,
    current: Option<&WeatherId>,
    constants: &Constants,
    source: &mut impl UniformSource,
) -> Result<Step, SchedulerError> {
    let from = current.unwrap_or(&constants.clear_state).clone();
    let table = def.transitions_for(&from)?;
    let draw = pick(table, source).map_err(|source| SchedulerError::Sampling {
        scheduler: def.id.clone(),
        state: from.clone(),
        source,
    })?;
    Ok(Step {
        next: normalize(draw.chosen, constants),
        drawn: draw.chosen.clone(),
        total_weight: draw.total_weight,
        rolled: draw.rolled,
        from,
    })
}

/// `ceil(max_simulated_duration / step_frequency)`; zero for a zero step.
pub fn warm_up_steps(step_frequency: Duration, constants: &Constants) -> u64 {
    let step = step_frequency.as_nanos();
    if step == 0 {
        return 0;
    }
    let steps = constants.max_simulated_duration().as_nanos().div_ceil(step);
    u64::try_from(steps).unwrap_or(u64::MAX)
}

/// Creates the chain runner for a region. It is due at `now`.
pub fn attach_region<'a>(
    state: &'a mut WeatherState,
    config: &RegionConfig,
    constants: &Constants,
    now: Duration,
) -> &'a mut RegionWeather {
    let step_frequency = config
        .step_frequency_secs
        .map_or_else(|| constants.default_step_frequency(), Duration::from_secs);
    let region = RegionWeather {
        id: config.id.clone(),
        scheduler: config.scheduler.clone(),
        step_frequency,
        random_initial_state: config.random_initial_state,
        current: None,
        next_update_at: now,
        initialized: false,
    };
    match state.regions.entry(config.id.clone()) {
        Entry::Occupied(mut slot) => {
            slot.insert(region);
            slot.into_mut()
        }
        Entry::Vacant(slot) => slot.insert(region),
    }
}

/// Removes a region's chain runner. Nothing else needs tearing down.
pub fn detach_region(state: &mut WeatherState, region: &RegionId) -> Option<RegionWeather> {
    state.regions.remove(region)
}

/// Sets up a region's starting weather and shows it.
///
/// With `random_initial_state` the chain runs silently for a session's worth
/// of steps so regions don't all start in the same state. A restored region
/// keeps its weather unless the scheduler has no table for it, in which case
/// it starts over. No transition events are produced here; the single
/// renderer call is the only visible effect.
pub fn initialize_region(
    region: &mut RegionWeather,
    registry: &SchedulerRegistry,
    constants: &Constants,
    renderer: &mut impl WeatherRenderer,
    source: &mut impl UniformSource,
) -> Result<InitOutcome, SchedulerError> {
    let Ok(def) = registry.lookup(&region.scheduler) else {
        return Ok(InitOutcome::Unresolved);
    };

    let origin = region.current.as_ref().unwrap_or(&constants.clear_state);
    let stale = (region.initialized && !def.has_table(origin)).then(|| origin.clone());

    let outcome = if region.initialized && stale.is_none() {
        InitOutcome::Restored
    } else {
        if stale.is_some() {
            region.current = None;
            region.initialized = false;
        }
        let started = if region.random_initial_state {
            let steps = warm_up_steps(region.step_frequency, constants);
            let mut state = region.current.clone();
            for _ in 0..steps {
                state = next_state(def, state.as_ref(), constants, source)?.next;
            }
            region.current = state;
            InitOutcome::WarmedUp { steps }
        } else {
            if region.current.is_none() {
                region.current = def
                    .first_state()
                    .and_then(|first| normalize(first, constants));
            }
            InitOutcome::Fresh
        };
        stale.map_or(started, |stale| InitOutcome::Reset { stale })
    };

    region.initialized = true;
    renderer.set_weather(
        &region.id,
        region.current.as_ref(),
        region.next_update_at + constants.shutdown_grace(),
    );
    Ok(outcome)
}

/// Initializes every region in id order. Unresolved schedulers and broken
/// chains are returned as faults; other regions are unaffected.
pub fn initialize_all(
    state: &mut WeatherState,
    registry: &SchedulerRegistry,
    constants: &Constants,
    renderer: &mut impl WeatherRenderer,
    source: &mut impl UniformSource,
) -> Vec<RegionFault> {
    let mut region_ids: Vec<RegionId> = state.regions.keys().cloned().collect();
    region_ids.sort();

    let mut faults = Vec::new();
    for region_id in region_ids {
        let Some(region) = state.regions.get_mut(&region_id) else {
            continue;
        };
        match initialize_region(region, registry, constants, renderer, source) {
            Ok(InitOutcome::Unresolved) => faults.push(RegionFault {
                error: SchedulerError::NotFound(region.scheduler.clone()),
                region: region_id,
            }),
            Ok(_) => {}
            Err(error) => faults.push(RegionFault {
                region: region_id,
                error,
            }),
        }
    }
    faults
}

/// Advance every due region by one chain step.
///
/// For each region with `next_update_at <= now`, in id order:
/// 1. Push `next_update_at` to `now + step_frequency` (even if the step fails).
/// 2. Draw the next state from its scheduler.
/// 3. Emit `WeatherTransition` if the state changed.
/// 4. Re-apply the state to the renderer, changed or not.
///
/// Returns the events produced and any regions that could not advance.
pub fn tick(
    state: &mut WeatherState,
    registry: &SchedulerRegistry,
    constants: &Constants,
    renderer: &mut impl WeatherRenderer,
    source: &mut impl UniformSource,
    now: Duration,
    event_level: EventLevel,
) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    let current_tick = state.meta.tick;
    state.meta.now = now;

    // Collect due regions, sorted for determinism.
    let mut due: Vec<RegionId> = state
        .regions
        .values()
        .filter(|region| region.next_update_at <= now)
        .map(|region| region.id.clone())
        .collect();
    due.sort();

    for region_id in due {
        let Some(region) = state.regions.get_mut(&region_id) else {
            continue;
        };
        region.next_update_at = now + region.step_frequency;

        let step = registry
            .lookup(&region.scheduler)
            .and_then(|def| next_state(def, region.current.as_ref(), constants, source));
        let step = match step {
            Ok(step) => step,
            Err(error) => {
                outcome.faults.push(RegionFault {
                    region: region_id,
                    error,
                });
                continue;
            }
        };

        if event_level == EventLevel::Debug {
            outcome.events.push(crate::emit(
                &mut state.counters,
                current_tick,
                now,
                Event::WeatherRoll {
                    region: region_id.clone(),
                    from: step.from.clone(),
                    drawn: step.drawn.clone(),
                    total_weight: step.total_weight,
                    rolled: step.rolled,
                },
            ));
        }

        if step.next != region.current {
            state.counters.transitions_total += 1;
            outcome.events.push(crate::emit(
                &mut state.counters,
                current_tick,
                now,
                Event::WeatherTransition {
                    region: region_id.clone(),
                    previous: region.current.clone(),
                    next: step.next.clone(),
                },
            ));
            region.current = step.next;
        }

        renderer.set_weather(
            &region_id,
            region.current.as_ref(),
            region.next_update_at + constants.shutdown_grace(),
        );
    }

    state.meta.tick += 1;
    outcome
}

use super::*;
use crate::test_fixtures::{
    base_content, empty_state, region_config, rid, scheduler, wid, RecordingRenderer, ScriptedDraws,
};
use std::time::Duration;

mod lifecycle;

// --- Shared test helpers ------------------------------------------------

const MINUTE: Duration = Duration::from_secs(60);

/// State with every content region attached at time zero, plus a registry of
/// the content schedulers.
fn setup(content: &WeatherContent) -> (WeatherState, SchedulerRegistry) {
    let mut state = empty_state(content);
    for config in &content.regions {
        attach_region(&mut state, config, &content.constants, Duration::ZERO);
    }
    let (registry, rejected) =
        SchedulerRegistry::load(content.schedulers.clone(), &content.constants.clear_state);
    assert!(rejected.is_empty(), "fixture content should validate: {rejected:?}");
    (state, registry)
}

fn region_test() -> RegionId {
    rid("region_test")
}

fn transitions(outcome: &TickOutcome) -> Vec<&Event> {
    outcome
        .events
        .iter()
        .map(|envelope| &envelope.event)
        .filter(|event| matches!(event, Event::WeatherTransition { .. }))
        .collect()
}

fn tick_at(
    state: &mut WeatherState,
    registry: &SchedulerRegistry,
    constants: &Constants,
    renderer: &mut RecordingRenderer,
    draws: &mut impl UniformSource,
    now: Duration,
) -> TickOutcome {
    tick(
        state,
        registry,
        constants,
        renderer,
        draws,
        now,
        EventLevel::Normal,
    )
}

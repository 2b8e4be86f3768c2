use super::*;

#[test]
fn attached_region_is_due_immediately() {
    let content = base_content();
    let mut state = empty_state(&content);
    let now = Duration::from_secs(900);
    let region = attach_region(&mut state, &content.regions[0], &content.constants, now);

    assert_eq!(region.next_update_at, now);
    assert_eq!(region.current, None);
    assert!(!region.initialized);
    assert_eq!(region.step_frequency, MINUTE);
}

#[test]
fn missing_step_frequency_uses_default() {
    let mut content = base_content();
    content.regions[0].step_frequency_secs = None;
    content.constants.default_step_frequency_secs = 90;
    let mut state = empty_state(&content);
    let region = attach_region(
        &mut state,
        &content.regions[0],
        &content.constants,
        Duration::ZERO,
    );
    assert_eq!(region.step_frequency, Duration::from_secs(90));
}

#[test]
fn reattaching_replaces_the_runner() {
    let content = base_content();
    let (mut state, registry) = setup(&content);
    let mut renderer = RecordingRenderer::default();
    let mut draws = ScriptedDraws::always_last();
    tick_at(
        &mut state,
        &registry,
        &content.constants,
        &mut renderer,
        &mut draws,
        Duration::ZERO,
    );
    assert!(state.regions[&region_test()].current.is_some());

    attach_region(&mut state, &content.regions[0], &content.constants, MINUTE);
    assert_eq!(state.regions.len(), 1);
    assert_eq!(state.regions[&region_test()].current, None);
}

#[test]
fn detached_region_stops_updating() {
    let content = base_content();
    let (mut state, registry) = setup(&content);
    let mut renderer = RecordingRenderer::default();
    let mut draws = ScriptedDraws::always_last();

    let removed = detach_region(&mut state, &region_test());
    assert!(removed.is_some());
    assert!(detach_region(&mut state, &region_test()).is_none());

    let outcome = tick_at(
        &mut state,
        &registry,
        &content.constants,
        &mut renderer,
        &mut draws,
        Duration::ZERO,
    );
    assert!(outcome.events.is_empty());
    assert!(renderer.calls.is_empty());
}

#[test]
fn resumed_state_reapplies_weather_without_warm_up() {
    let mut content = base_content();
    content.regions[0].random_initial_state = true;
    let (mut state, registry) = setup(&content);
    let mut board = WeatherBoard::new();
    let mut rng = RngSource::seeded(5);
    initialize_all(
        &mut state,
        &registry,
        &content.constants,
        &mut board,
        &mut rng,
    );
    for step in 0..50u32 {
        tick(
            &mut state,
            &registry,
            &content.constants,
            &mut board,
            &mut rng,
            MINUTE * step,
            EventLevel::Normal,
        );
    }

    let saved = serde_json::to_string(&state).unwrap();
    let mut restored: WeatherState = serde_json::from_str(&saved).unwrap();
    let mut renderer = RecordingRenderer::default();
    let mut draws = ScriptedDraws::always_last();

    let faults = initialize_all(
        &mut restored,
        &registry,
        &content.constants,
        &mut renderer,
        &mut draws,
    );

    assert!(faults.is_empty());
    assert_eq!(draws.consumed(), 0);
    let before = &state.regions[&region_test()];
    let after = &restored.regions[&region_test()];
    assert_eq!(after.current, before.current);
    assert_eq!(after.next_update_at, before.next_update_at);
    assert_eq!(renderer.calls.len(), 1);
    assert_eq!(renderer.calls[0].weather, before.current);
    assert_eq!(
        renderer.calls[0].expires_at,
        before.next_update_at + content.constants.shutdown_grace()
    );
    assert_eq!(restored.meta.tick, 50);
}

/// Saved state for `region_test`, parked in `weather` mid-session.
fn saved_in(content: &WeatherContent, weather: &str) -> WeatherState {
    let (mut state, registry) = setup(content);
    let mut renderer = RecordingRenderer::default();
    let mut draws = ScriptedDraws::always_first();
    initialize_all(
        &mut state,
        &registry,
        &content.constants,
        &mut renderer,
        &mut draws,
    );
    let region = state.regions.get_mut(&region_test()).unwrap();
    region.current = Some(wid(weather));
    region.next_update_at = MINUTE * 10;
    let saved = serde_json::to_string(&state).unwrap();
    serde_json::from_str(&saved).unwrap()
}

#[test]
fn restored_state_without_table_starts_over() {
    let content = base_content();
    let (_, registry) = setup(&content);
    let mut restored = saved_in(&content, "Sandstorm");
    let mut renderer = RecordingRenderer::default();
    let mut draws = ScriptedDraws::always_last();

    let region = restored.regions.get_mut(&region_test()).unwrap();
    let outcome = initialize_region(
        region,
        &registry,
        &content.constants,
        &mut renderer,
        &mut draws,
    )
    .unwrap();

    assert_eq!(
        outcome,
        InitOutcome::Reset {
            stale: wid("Sandstorm")
        }
    );
    // Snowfall's first configured state is Clear.
    assert_eq!(region.current, None);
    assert!(region.initialized);
    assert_eq!(draws.consumed(), 0);
    assert_eq!(renderer.calls.len(), 1);
    assert_eq!(renderer.calls[0].weather, None);

    let outcome = tick_at(
        &mut restored,
        &registry,
        &content.constants,
        &mut renderer,
        &mut draws,
        MINUTE * 10,
    );
    assert!(outcome.faults.is_empty());
    assert_eq!(restored.regions[&region_test()].current, Some(wid("Light")));
}

#[test]
fn restored_state_without_table_warms_up_again() {
    let mut content = base_content();
    content.regions[0].random_initial_state = true;
    let (_, registry) = setup(&content);
    let mut restored = saved_in(&content, "Sandstorm");
    let mut renderer = RecordingRenderer::default();
    let mut draws = ScriptedDraws::always_last();

    let faults = initialize_all(
        &mut restored,
        &registry,
        &content.constants,
        &mut renderer,
        &mut draws,
    );

    assert!(faults.is_empty());
    assert_eq!(draws.consumed(), 360);
    assert_eq!(restored.regions[&region_test()].current, Some(wid("Light")));
    assert_eq!(renderer.calls[0].weather, Some(wid("Light")));
}

#[test]
fn restored_state_with_table_is_kept() {
    let content = base_content();
    let (_, registry) = setup(&content);
    let mut restored = saved_in(&content, "Light");
    let mut renderer = RecordingRenderer::default();
    let mut draws = ScriptedDraws::always_last();

    let region = restored.regions.get_mut(&region_test()).unwrap();
    let outcome = initialize_region(
        region,
        &registry,
        &content.constants,
        &mut renderer,
        &mut draws,
    )
    .unwrap();

    assert_eq!(outcome, InitOutcome::Restored);
    assert_eq!(region.current, Some(wid("Light")));
    assert_eq!(region.next_update_at, MINUTE * 10);
}

#[test]
fn board_follows_the_chain_and_lapses_without_heartbeat() {
    let content = base_content();
    let (mut state, registry) = setup(&content);
    let mut board = WeatherBoard::new();
    let mut draws = ScriptedDraws::always_last();

    tick(
        &mut state,
        &registry,
        &content.constants,
        &mut board,
        &mut draws,
        Duration::ZERO,
        EventLevel::Normal,
    );
    assert_eq!(board.visible(&region_test(), Duration::from_secs(70)), Some(&wid("Light")));

    // No further ticks: the weather lapses after the grace period.
    assert_eq!(board.visible(&region_test(), Duration::from_secs(76)), None);

    tick(
        &mut state,
        &registry,
        &content.constants,
        &mut board,
        &mut draws,
        MINUTE,
        EventLevel::Normal,
    );
    assert_eq!(board.visible(&region_test(), Duration::from_secs(130)), Some(&wid("Light")));
}

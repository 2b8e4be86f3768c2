use crate::state::{EventTx, SharedSim, SimState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Advances the simulation until `max_ticks` is reached (forever if `None`).
///
/// `ticks_per_sec <= 0` runs flat out, yielding between ticks. While `paused`
/// is set no ticks run and simulation time stands still.
pub async fn run_tick_loop(
    sim: SharedSim,
    event_tx: EventTx,
    ticks_per_sec: f64,
    max_ticks: Option<u64>,
    paused: Arc<AtomicBool>,
) {
    let mut interval = if ticks_per_sec > 0.0 {
        let mut iv = tokio::time::interval(Duration::from_secs_f64(1.0 / ticks_per_sec));
        iv.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
        Some(iv)
    } else {
        None
    };

    loop {
        if paused.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            continue;
        }

        let (events, done) = {
            let mut guard = sim.lock();
            let now = guard.next_tick_time();
            let SimState {
                ref mut weather,
                ref content,
                ref registry,
                ref mut board,
                ref mut source,
                event_level,
                ..
            } = *guard;
            let outcome = weather_core::tick(
                weather,
                registry,
                &content.constants,
                board,
                source,
                now,
                event_level,
            );
            for fault in &outcome.faults {
                tracing::debug!(region = %fault.region, error = %fault.error, "region skipped");
            }

            let metrics_every = guard.metrics_every;
            if metrics_every > 0 && guard.weather.meta.tick % metrics_every == 0 {
                let snapshot = weather_core::compute_metrics(&guard.weather);
                guard.push_metrics(snapshot);
            }

            let done = max_ticks.is_some_and(|max| guard.weather.meta.tick >= max);
            (outcome.events, done)
        };

        // No subscribers is fine.
        let _ = event_tx.send(events);

        if done {
            break;
        }

        if let Some(ref mut iv) = interval {
            iv.tick().await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_test_state;
    use weather_core::Event;

    #[tokio::test]
    async fn runs_to_max_ticks_and_samples_metrics() {
        let app = make_test_state();
        app.sim.lock().metrics_every = 10;
        let mut rx = app.event_tx.subscribe();

        run_tick_loop(
            app.sim.clone(),
            app.event_tx.clone(),
            0.0,
            Some(50),
            app.paused.clone(),
        )
        .await;

        let sim = app.sim.lock();
        assert_eq!(sim.weather.meta.tick, 50);
        assert_eq!(sim.weather.meta.now, Duration::from_secs(49 * 60));
        assert_eq!(sim.metrics_history.len(), 5);
        drop(sim);

        let mut batches = 0;
        while let Ok(batch) = rx.try_recv() {
            assert!(batch
                .iter()
                .all(|e| matches!(e.event, Event::WeatherTransition { .. })));
            batches += 1;
        }
        assert_eq!(batches, 50);
    }

    #[tokio::test]
    async fn paused_loop_does_not_tick() {
        let app = make_test_state();
        app.paused.store(true, Ordering::Relaxed);
        let handle = tokio::spawn(run_tick_loop(
            app.sim.clone(),
            app.event_tx.clone(),
            0.0,
            Some(10),
            app.paused.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(app.sim.lock().weather.meta.tick, 0);

        app.paused.store(false, Ordering::Relaxed);
        handle.await.unwrap();
        assert_eq!(app.sim.lock().weather.meta.tick, 10);
    }
}

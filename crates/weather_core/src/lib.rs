//! `weather_core`: deterministic weather chain scheduling.
//!
//! No network, no logging. All randomness via the passed-in `UniformSource`.
//! Regions that cannot advance are returned as faults; callers decide what
//! to do with them.

pub mod analysis;
mod engine;
mod error;
pub mod metrics;
mod render;
mod sampling;
mod scheduler;
mod types;

pub use analysis::{mean_dwell_steps, stationary_distribution};
pub use engine::{
    attach_region, detach_region, initialize_all, initialize_region, next_state, normalize, tick,
    warm_up_steps, InitOutcome, Step, TickOutcome,
};
pub use error::{ConfigurationError, RegionFault, SamplingError, SchedulerError};
pub use metrics::{compute_metrics, write_metrics_csv, MetricsFileWriter, MetricsSnapshot};
pub use render::{AppliedWeather, WeatherBoard, WeatherRenderer};
pub use sampling::{pick, Draw, RngSource, UniformSource};
pub use scheduler::{validate_scheduler, SchedulerRegistry};
pub use types::*;

pub(crate) fn emit(
    counters: &mut Counters,
    tick: u64,
    at: std::time::Duration,
    event: Event,
) -> EventEnvelope {
    let id = EventId(format!("evt_{:06}", counters.next_event_id));
    counters.next_event_id += 1;
    EventEnvelope {
        id,
        tick,
        at,
        event,
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

#[cfg(test)]
mod tests;

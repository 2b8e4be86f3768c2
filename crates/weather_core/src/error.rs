//! Error types for `weather_core`.
//!
//! [`ConfigurationError`] is raised while loading content and keeps a broken
//! scheduler out of the registry. [`SchedulerError`] and [`SamplingError`] are
//! the runtime failures of a single region; the tick loop reports them and
//! moves on.

use crate::{RegionId, SchedulerId, WeatherId};

/// Authoring mistakes in a scheduler definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("scheduler '{scheduler}' defines no states")]
    NoStates { scheduler: SchedulerId },

    #[error("scheduler '{scheduler}' state '{state}' has an empty transition table")]
    EmptyTransitionTable {
        scheduler: SchedulerId,
        state: WeatherId,
    },

    #[error(
        "scheduler '{scheduler}' state '{state}' transition to '{target}' has invalid weight {weight}"
    )]
    InvalidWeight {
        scheduler: SchedulerId,
        state: WeatherId,
        target: WeatherId,
        weight: f64,
    },

    #[error("scheduler '{scheduler}' state '{state}' has transition weights summing to zero")]
    ZeroTotalWeight {
        scheduler: SchedulerId,
        state: WeatherId,
    },

    #[error(
        "scheduler '{scheduler}' state '{state}' can transition to '{target}', which has no transition table"
    )]
    DanglingTarget {
        scheduler: SchedulerId,
        state: WeatherId,
        target: WeatherId,
    },

    #[error(
        "scheduler '{scheduler}' has no transition table for the clear state '{clear_state}'"
    )]
    MissingClearTable {
        scheduler: SchedulerId,
        clear_state: WeatherId,
    },

    #[error("scheduler '{scheduler}' is defined more than once")]
    DuplicateScheduler { scheduler: SchedulerId },
}

/// Failures of a single weighted draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SamplingError {
    #[error("transition table is empty")]
    EmptyTransitionTable,

    #[error("transition weights sum to zero")]
    ZeroTotalWeight,
}

/// Runtime failures resolving or stepping a region's chain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler '{0}' not found")]
    NotFound(SchedulerId),

    #[error("scheduler '{scheduler}' has no transition table for state '{state}'")]
    UnknownState {
        scheduler: SchedulerId,
        state: WeatherId,
    },

    #[error("scheduler '{scheduler}' state '{state}': {source}")]
    Sampling {
        scheduler: SchedulerId,
        state: WeatherId,
        #[source]
        source: SamplingError,
    },
}

/// A region skipped during a tick, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFault {
    pub region: RegionId,
    pub error: SchedulerError,
}

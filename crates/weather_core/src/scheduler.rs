//! Scheduler definitions and the read-only registry that resolves them by name.

use std::collections::{HashMap, HashSet};

use crate::{
    ConfigurationError, SchedulerDef, SchedulerError, SchedulerId, TransitionTable, WeatherId,
};

impl SchedulerDef {
    /// Transition table for `state`. Clear is looked up like any other id.
    pub fn transitions_for(&self, state: &WeatherId) -> Result<&TransitionTable, SchedulerError> {
        self.states
            .get(state)
            .map(|def| &def.transitions)
            .ok_or_else(|| SchedulerError::UnknownState {
                scheduler: self.id.clone(),
                state: state.clone(),
            })
    }

    /// First state in configuration order; the starting state when no warm-up runs.
    pub fn first_state(&self) -> Option<&WeatherId> {
        self.states.keys().next()
    }

    /// True if a region in `state` can take its next step.
    pub fn has_table(&self, state: &WeatherId) -> bool {
        self.states.contains_key(state)
    }
}

/// Checks one definition for authoring mistakes. Empty result means usable.
///
/// Every attached region starts out Clear, so `clear_state` must have a table.
pub fn validate_scheduler(
    def: &SchedulerDef,
    clear_state: &WeatherId,
) -> Vec<ConfigurationError> {
    let mut errors = Vec::new();
    if def.states.is_empty() {
        errors.push(ConfigurationError::NoStates {
            scheduler: def.id.clone(),
        });
        return errors;
    }
    if !def.states.contains_key(clear_state) {
        errors.push(ConfigurationError::MissingClearTable {
            scheduler: def.id.clone(),
            clear_state: clear_state.clone(),
        });
    }

    for (state, state_def) in &def.states {
        if state_def.transitions.is_empty() {
            errors.push(ConfigurationError::EmptyTransitionTable {
                scheduler: def.id.clone(),
                state: state.clone(),
            });
            continue;
        }

        let mut total = 0.0;
        for (target, &weight) in &state_def.transitions {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(ConfigurationError::InvalidWeight {
                    scheduler: def.id.clone(),
                    state: state.clone(),
                    target: target.clone(),
                    weight,
                });
                continue;
            }
            total += weight;
            // Zero-weight targets are never reached, so they may stay undefined.
            if weight > 0.0 && !def.states.contains_key(target) {
                errors.push(ConfigurationError::DanglingTarget {
                    scheduler: def.id.clone(),
                    state: state.clone(),
                    target: target.clone(),
                });
            }
        }
        if total <= 0.0 {
            errors.push(ConfigurationError::ZeroTotalWeight {
                scheduler: def.id.clone(),
                state: state.clone(),
            });
        }
    }

    errors
}

/// Arena of validated, immutable scheduler definitions indexed by name.
#[derive(Debug, Clone, Default)]
pub struct SchedulerRegistry {
    defs: Vec<SchedulerDef>,
    index: HashMap<SchedulerId, usize>,
}

impl SchedulerRegistry {
    /// Validates and indexes `defs`. Definitions with any error are left out
    /// and their errors returned, so a broken scheduler never resolves.
    pub fn load(
        defs: Vec<SchedulerDef>,
        clear_state: &WeatherId,
    ) -> (Self, Vec<ConfigurationError>) {
        let mut registry = Self::default();
        let mut rejected = Vec::new();
        let mut seen: HashMap<SchedulerId, usize> = HashMap::new();
        for def in &defs {
            *seen.entry(def.id.clone()).or_insert(0) += 1;
        }

        let mut reported = HashSet::new();
        for def in defs {
            if seen.get(&def.id).copied().unwrap_or(0) > 1 {
                if reported.insert(def.id.clone()) {
                    rejected.push(ConfigurationError::DuplicateScheduler { scheduler: def.id });
                }
                continue;
            }
            let errors = validate_scheduler(&def, clear_state);
            if errors.is_empty() {
                registry.index.insert(def.id.clone(), registry.defs.len());
                registry.defs.push(def);
            } else {
                rejected.extend(errors);
            }
        }
        (registry, rejected)
    }

    /// Indexes `defs` without validation, so a malformed definition can reach
    /// the runtime.
    #[cfg(any(test, feature = "test-support"))]
    pub fn unchecked(defs: Vec<SchedulerDef>) -> Self {
        let mut registry = Self::default();
        for def in defs {
            registry.index.insert(def.id.clone(), registry.defs.len());
            registry.defs.push(def);
        }
        registry
    }

    pub fn lookup(&self, id: &SchedulerId) -> Result<&SchedulerDef, SchedulerError> {
        self.index
            .get(id)
            .and_then(|&slot| self.defs.get(slot))
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &SchedulerId) -> bool {
        self.index.contains_key(id)
    }

    /// Definitions in load order.
    pub fn iter(&self) -> impl Iterator<Item = &SchedulerDef> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{blizzard_scheduler, scheduler, snowfall_scheduler, wid};

    fn load(defs: Vec<SchedulerDef>) -> (SchedulerRegistry, Vec<ConfigurationError>) {
        SchedulerRegistry::load(defs, &wid("Clear"))
    }

    fn validate(def: &SchedulerDef) -> Vec<ConfigurationError> {
        validate_scheduler(def, &wid("Clear"))
    }

    #[test]
    fn valid_schedulers_resolve_by_name() {
        let (registry, rejected) = load(vec![snowfall_scheduler(), blizzard_scheduler()]);
        assert!(rejected.is_empty(), "{rejected:?}");
        assert_eq!(registry.len(), 2);
        let def = registry.lookup(&SchedulerId::new("Blizzard")).unwrap();
        assert_eq!(def.id.as_str(), "Blizzard");
    }

    #[test]
    fn unknown_name_is_not_found() {
        let (registry, _) = load(vec![snowfall_scheduler()]);
        let err = registry.lookup(&SchedulerId::new("Monsoon")).unwrap_err();
        assert_eq!(err, SchedulerError::NotFound(SchedulerId::new("Monsoon")));
    }

    #[test]
    fn transitions_for_treats_clear_like_any_state() {
        let def = snowfall_scheduler();
        let clear = def.transitions_for(&wid("Clear")).unwrap();
        assert_eq!(clear.len(), 2);
        assert!(matches!(
            def.transitions_for(&wid("Hail")),
            Err(SchedulerError::UnknownState { .. })
        ));
    }

    #[test]
    fn first_state_follows_configuration_order() {
        let def = scheduler(
            "Order",
            &[("Rain", &[("Rain", 1.0)]), ("Clear", &[("Rain", 1.0)])],
        );
        assert_eq!(def.first_state(), Some(&wid("Rain")));
    }

    #[test]
    fn only_configured_states_have_tables() {
        let def = blizzard_scheduler();
        assert!(def.has_table(&wid("Clear")));
        assert!(def.has_table(&wid("SnowfallHeavy")));
        assert!(!def.has_table(&wid("Sandstorm")));
        let tuned = scheduler("Tuned", &[("Clear", &[("Clear", 5.0), ("Hail", 0.0)])]);
        assert!(!tuned.has_table(&wid("Hail")));
    }

    #[test]
    fn empty_table_rejects_scheduler() {
        let broken = scheduler(
            "Broken",
            &[("Clear", &[("Clear", 1.0), ("Rain", 1.0)]), ("Rain", &[])],
        );
        let (registry, rejected) = load(vec![broken]);
        assert!(registry.is_empty());
        assert!(matches!(
            rejected.as_slice(),
            [ConfigurationError::EmptyTransitionTable { state, .. }] if state.as_str() == "Rain"
        ));
    }

    #[test]
    fn dangling_positive_target_is_rejected() {
        let broken = scheduler("Broken", &[("Clear", &[("Clear", 5.0), ("Hail", 1.0)])]);
        let errors = validate(&broken);
        assert!(matches!(
            errors.as_slice(),
            [ConfigurationError::DanglingTarget { target, .. }] if target.as_str() == "Hail"
        ));
    }

    #[test]
    fn zero_weight_target_may_be_undefined() {
        let tuned = scheduler("Tuned", &[("Clear", &[("Clear", 5.0), ("Hail", 0.0)])]);
        assert!(validate(&tuned).is_empty());
    }

    #[test]
    fn negative_and_nan_weights_are_invalid() {
        let broken = scheduler(
            "Broken",
            &[("Clear", &[("Clear", 1.0), ("Rain", -2.0)]), ("Rain", &[("Rain", f64::NAN)])],
        );
        let errors = validate(&broken);
        let invalid = errors
            .iter()
            .filter(|e| matches!(e, ConfigurationError::InvalidWeight { .. }))
            .count();
        assert_eq!(invalid, 2);
        assert!(errors.iter().any(|e| matches!(
            e,
            ConfigurationError::ZeroTotalWeight { state, .. } if state.as_str() == "Rain"
        )));
    }

    #[test]
    fn no_states_is_rejected() {
        let empty = scheduler("Empty", &[]);
        assert_eq!(
            validate(&empty),
            vec![ConfigurationError::NoStates {
                scheduler: SchedulerId::new("Empty")
            }]
        );
    }

    #[test]
    fn duplicate_names_reject_every_copy() {
        let (registry, rejected) = load(vec![
            snowfall_scheduler(),
            snowfall_scheduler(),
            blizzard_scheduler(),
        ]);
        assert!(!registry.contains(&SchedulerId::new("Snowfall")));
        assert!(registry.contains(&SchedulerId::new("Blizzard")));
        assert_eq!(
            rejected,
            vec![ConfigurationError::DuplicateScheduler {
                scheduler: SchedulerId::new("Snowfall")
            }]
        );
    }

    #[test]
    fn missing_clear_table_rejects_scheduler() {
        let no_clear = scheduler(
            "Rainy",
            &[
                ("Drizzle", &[("Drizzle", 3.0), ("Downpour", 1.0)]),
                ("Downpour", &[("Drizzle", 1.0)]),
            ],
        );
        assert_eq!(
            validate(&no_clear),
            vec![ConfigurationError::MissingClearTable {
                scheduler: SchedulerId::new("Rainy"),
                clear_state: wid("Clear"),
            }]
        );
        let (registry, rejected) = load(vec![no_clear]);
        assert!(registry.is_empty());
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn clear_sentinel_comes_from_constants() {
        let calm = scheduler("Calm", &[("None", &[("None", 1.0)])]);
        assert!(validate_scheduler(&calm, &wid("None")).is_empty());
        assert_eq!(validate(&calm).len(), 1);
    }
}

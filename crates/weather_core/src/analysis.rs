//! Long-run behaviour of a scheduler, for tuning weights.

use indexmap::IndexMap;

use crate::{Constants, SchedulerDef, WeatherId};

/// Long-run share of time spent in each state, by power iteration.
///
/// Iterates the lazy chain `(I + P) / 2`, which has the same stationary
/// distribution as `P` but converges for periodic chains too. Starts from
/// Clear. Targets without a table of their own are absorbing. Stops early
/// once no entry moves by more than `1e-12`.
pub fn stationary_distribution(
    def: &SchedulerDef,
    constants: &Constants,
    iterations: u32,
) -> IndexMap<WeatherId, f64> {
    let mut states: Vec<WeatherId> = def.states.keys().cloned().collect();
    for state_def in def.states.values() {
        for target in state_def.transitions.keys() {
            if !states.contains(target) {
                states.push(target.clone());
            }
        }
    }
    let index_of = |id: &WeatherId| states.iter().position(|s| s == id);

    let mut dist = vec![0.0; states.len()];
    if let Some(slot) = index_of(&constants.clear_state) {
        dist[slot] = 1.0;
    }

    let rows: Vec<Vec<(usize, f64)>> = states
        .iter()
        .enumerate()
        .map(|(from, id)| transition_row(def, id, from, &index_of))
        .collect();

    for _ in 0..iterations {
        let mut next = vec![0.0; states.len()];
        for (from, row) in rows.iter().enumerate() {
            let mass = dist[from];
            if mass <= 0.0 {
                continue;
            }
            next[from] += mass * 0.5;
            for &(to, p) in row {
                next[to] += mass * 0.5 * p;
            }
        }
        let delta = dist
            .iter()
            .zip(&next)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        dist = next;
        if delta < 1e-12 {
            break;
        }
    }

    states.into_iter().zip(dist).collect()
}

/// Normalized outgoing probabilities of one state. Absorbing if it has no
/// usable table.
fn transition_row(
    def: &SchedulerDef,
    id: &WeatherId,
    from: usize,
    index_of: &impl Fn(&WeatherId) -> Option<usize>,
) -> Vec<(usize, f64)> {
    let Some(state_def) = def.states.get(id) else {
        return vec![(from, 1.0)];
    };
    let total: f64 = state_def
        .transitions
        .values()
        .copied()
        .filter(|w| *w > 0.0)
        .sum();
    if total <= 0.0 {
        return vec![(from, 1.0)];
    }
    state_def
        .transitions
        .iter()
        .filter(|(_, weight)| **weight > 0.0)
        .filter_map(|(target, weight)| index_of(target).map(|to| (to, weight / total)))
        .collect()
}

/// Expected number of consecutive steps a region stays in `state` once it
/// enters it. `None` for absorbing or unknown states.
pub fn mean_dwell_steps(def: &SchedulerDef, state: &WeatherId) -> Option<f64> {
    let table = &def.states.get(state)?.transitions;
    let total: f64 = table.values().copied().filter(|w| *w > 0.0).sum();
    let stay = table.get(state).copied().filter(|w| *w > 0.0).unwrap_or(0.0);
    let leave = total - stay;
    (total > 0.0 && leave > 0.0).then(|| total / leave)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{blizzard_scheduler, scheduler, snowfall_scheduler, wid};

    fn share(dist: &IndexMap<WeatherId, f64>, id: &str) -> f64 {
        dist.get(&wid(id)).copied().unwrap_or(0.0)
    }

    #[test]
    fn snowfall_matches_closed_form() {
        // Two-state chain: pi(Light) = p(C->L) / (p(C->L) + p(L->C)).
        let dist = stationary_distribution(&snowfall_scheduler(), &Constants::default(), 100_000);
        let to_light = 1.0 / 163.0;
        let to_clear = 1.0 / 101.0;
        let expected_light = to_light / (to_light + to_clear);
        assert!((share(&dist, "Light") - expected_light).abs() < 1e-6);
        assert!((share(&dist, "Clear") + share(&dist, "Light") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weight_state_only_reached_through_other_paths() {
        let dist = stationary_distribution(&blizzard_scheduler(), &Constants::default(), 200_000);
        let total: f64 = dist.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        // Heavy is reachable from Medium, so it still gets some share.
        assert!(share(&dist, "SnowfallHeavy") > 0.0);
        assert!(share(&dist, "Clear") > share(&dist, "SnowfallHeavy"));
    }

    #[test]
    fn periodic_chain_converges() {
        let flip = scheduler(
            "Flip",
            &[("Clear", &[("Rain", 1.0)]), ("Rain", &[("Clear", 1.0)])],
        );
        let dist = stationary_distribution(&flip, &Constants::default(), 10_000);
        assert!((share(&dist, "Clear") - 0.5).abs() < 1e-6);
        assert!((share(&dist, "Rain") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_iterations_is_the_starting_point() {
        let dist = stationary_distribution(&snowfall_scheduler(), &Constants::default(), 0);
        assert!((share(&dist, "Clear") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dwell_steps() {
        let def = snowfall_scheduler();
        let light = mean_dwell_steps(&def, &wid("Light")).unwrap();
        assert!((light - 101.0).abs() < 1e-9);
        assert!(mean_dwell_steps(&def, &wid("Hail")).is_none());
        let sticky = scheduler("Sticky", &[("Clear", &[("Clear", 1.0)])]);
        assert!(mean_dwell_steps(&sticky, &wid("Clear")).is_none());
    }
}

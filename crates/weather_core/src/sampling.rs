//! Weighted pick over a transition table.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{SamplingError, TransitionTable, WeatherId};

/// A uniform random source. Sampling is the only caller, one draw per pick.
pub trait UniformSource {
    /// Returns a value uniformly distributed in `[0, upper)`. `upper` is always > 0.
    fn uniform(&mut self, upper: f64) -> f64;
}

/// Adapts any `rand::Rng` into a [`UniformSource`].
#[derive(Debug, Clone)]
pub struct RngSource<R>(pub R);

impl RngSource<ChaCha8Rng> {
    pub fn seeded(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> UniformSource for RngSource<R> {
    fn uniform(&mut self, upper: f64) -> f64 {
        self.0.gen_range(0.0..upper)
    }
}

/// Outcome of one pick.
#[derive(Debug, Clone, Copy)]
pub struct Draw<'a> {
    pub chosen: &'a WeatherId,
    pub total_weight: f64,
    pub rolled: f64,
}

/// Draws one candidate with probability proportional to its weight.
///
/// Candidates are walked in table order, so a fixed table and a fixed draw
/// always yield the same candidate. Zero-weight entries are never chosen.
pub fn pick<'a>(
    table: &'a TransitionTable,
    source: &mut impl UniformSource,
) -> Result<Draw<'a>, SamplingError> {
    if table.is_empty() {
        return Err(SamplingError::EmptyTransitionTable);
    }
    let total_weight: f64 = table.values().copied().filter(|w| *w > 0.0).sum();
    if total_weight <= 0.0 {
        return Err(SamplingError::ZeroTotalWeight);
    }

    let rolled = source.uniform(total_weight);
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (candidate, &weight) in table {
        if weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = Some(candidate);
        if cumulative > rolled {
            return Ok(Draw {
                chosen: candidate,
                total_weight,
                rolled,
            });
        }
    }

    // Rounding can leave the roll a hair above the final partial sum.
    last_positive
        .map(|chosen| Draw {
            chosen,
            total_weight,
            rolled,
        })
        .ok_or(SamplingError::ZeroTotalWeight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{table, ScriptedDraws};
    use std::collections::HashMap;

    #[test]
    fn empty_table_fails_without_drawing() {
        let empty = TransitionTable::new();
        let mut draws = ScriptedDraws::new(vec![0.5]);
        let err = pick(&empty, &mut draws).unwrap_err();
        assert_eq!(err, SamplingError::EmptyTransitionTable);
        assert_eq!(draws.consumed(), 0);
    }

    #[test]
    fn all_zero_weights_fail() {
        let zeroes = table(&[("Clear", 0.0), ("Rain", 0.0)]);
        let mut draws = ScriptedDraws::new(vec![0.5]);
        assert_eq!(
            pick(&zeroes, &mut draws).unwrap_err(),
            SamplingError::ZeroTotalWeight
        );
    }

    #[test]
    fn consumes_exactly_one_draw() {
        let t = table(&[("Clear", 1.0), ("Rain", 1.0)]);
        let mut draws = ScriptedDraws::new(vec![0.1, 0.9]);
        pick(&t, &mut draws).unwrap();
        assert_eq!(draws.consumed(), 1);
    }

    #[test]
    fn roll_walks_cumulative_weights_in_table_order() {
        let t = table(&[("Clear", 1.0), ("Rain", 2.0), ("Snow", 1.0)]);
        // total 4: [0,1) Clear, [1,3) Rain, [3,4) Snow
        let mut draws = ScriptedDraws::new(vec![0.0, 0.24, 0.25, 0.74, 0.75, 0.999]);
        let picked: Vec<&str> = (0..6)
            .map(|_| pick(&t, &mut draws).unwrap().chosen.as_str())
            .collect();
        assert_eq!(picked, ["Clear", "Clear", "Rain", "Rain", "Snow", "Snow"]);
    }

    #[test]
    fn zero_weight_entry_is_never_selected() {
        let t = table(&[("Hail", 0.0), ("Clear", 3.0), ("Ash", 0.0), ("Rain", 1.0)]);
        let mut rng = RngSource::seeded(7);
        for _ in 0..20_000 {
            let chosen = pick(&t, &mut rng).unwrap().chosen.as_str();
            assert!(chosen != "Hail" && chosen != "Ash", "picked {chosen}");
        }
        // Boundary rolls cannot land on the zero-weight entries either.
        let mut edges = ScriptedDraws::new(vec![0.0, 0.75, 0.999_999]);
        assert_eq!(pick(&t, &mut edges).unwrap().chosen.as_str(), "Clear");
        assert_eq!(pick(&t, &mut edges).unwrap().chosen.as_str(), "Rain");
        assert_eq!(pick(&t, &mut edges).unwrap().chosen.as_str(), "Rain");
    }

    #[test]
    fn rounding_overrun_falls_back_to_last_positive_entry() {
        let t = table(&[("Clear", 1.0), ("Rain", 1.0), ("Fog", 0.0)]);
        let mut overrun = ScriptedDraws::new(vec![1.0]);
        assert_eq!(pick(&t, &mut overrun).unwrap().chosen.as_str(), "Rain");
    }

    #[test]
    fn frequencies_converge_to_weight_share() {
        let t = table(&[("Clear", 162.0), ("Light", 30.0), ("Heavy", 8.0)]);
        let mut rng = RngSource::seeded(42);
        let draws = 100_000;
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for _ in 0..draws {
            *counts.entry(pick(&t, &mut rng).unwrap().chosen.as_str()).or_insert(0) += 1;
        }
        for (id, weight) in [("Clear", 162.0), ("Light", 30.0), ("Heavy", 8.0)] {
            let observed = f64::from(counts[id]) / f64::from(draws);
            let expected = weight / 200.0;
            assert!(
                (observed - expected).abs() < 0.01,
                "{id}: observed {observed:.4}, expected {expected:.4}"
            );
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let t = table(&[("Clear", 5.0), ("Rain", 3.0), ("Snow", 2.0)]);
        let mut a = RngSource::seeded(99);
        let mut b = RngSource::seeded(99);
        for _ in 0..500 {
            assert_eq!(
                pick(&t, &mut a).unwrap().chosen,
                pick(&t, &mut b).unwrap().chosen
            );
        }
    }
}

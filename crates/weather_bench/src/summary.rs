use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use weather_core::MetricsSnapshot;

type Extractor = (&'static str, fn(&MetricsSnapshot) -> f64);

const EXTRACTORS: &[Extractor] = &[
    ("active_fraction", MetricsSnapshot::active_fraction),
    ("regions_active", |s: &MetricsSnapshot| f64::from(s.regions_active)),
    ("regions_clear", |s: &MetricsSnapshot| f64::from(s.regions_clear)),
    ("regions_uninitialized", |s: &MetricsSnapshot| {
        f64::from(s.regions_uninitialized)
    }),
    ("transitions_total", |s: &MetricsSnapshot| {
        s.transitions_total as f64
    }),
];

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub seed_count: usize,
    pub stalled_count: usize,
    pub metrics: Vec<MetricSummary>,
    pub occupancy: Vec<OccupancySummary>,
}

#[derive(Debug, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

/// Observed share of one `Scheduler/Weather` across seeds, next to its
/// long-run stationary share.
#[derive(Debug, Serialize)]
pub struct OccupancySummary {
    pub key: String,
    pub expected: Option<f64>,
    #[serde(flatten)]
    pub observed: MetricSummary,
}

/// One finished seed, as seen by the summary.
pub struct SeedView<'a> {
    pub snapshot: &'a MetricsSnapshot,
    pub occupancy: &'a BTreeMap<String, f64>,
    pub stalled: bool,
}

/// `expected` maps occupancy keys to stationary shares. Keys a seed never
/// visited count as zero for that seed.
pub fn compute_summary(seeds: &[SeedView<'_>], expected: &BTreeMap<String, f64>) -> SummaryStats {
    let metrics = EXTRACTORS
        .iter()
        .map(|(name, extract)| {
            let values: Vec<f64> = seeds.iter().map(|s| extract(s.snapshot)).collect();
            compute_metric_summary(name, &values)
        })
        .collect();

    let keys: BTreeSet<&String> = seeds
        .iter()
        .flat_map(|s| s.occupancy.keys())
        .chain(expected.keys())
        .collect();
    let occupancy = keys
        .into_iter()
        .map(|key| {
            let values: Vec<f64> = seeds
                .iter()
                .map(|s| s.occupancy.get(key).copied().unwrap_or(0.0))
                .collect();
            OccupancySummary {
                key: key.clone(),
                expected: expected.get(key).copied(),
                observed: compute_metric_summary(key, &values),
            }
        })
        .collect();

    SummaryStats {
        seed_count: seeds.len(),
        stalled_count: seeds.iter().filter(|s| s.stalled).count(),
        metrics,
        occupancy,
    }
}

fn compute_metric_summary(name: &str, values: &[f64]) -> MetricSummary {
    if values.is_empty() {
        return MetricSummary {
            name: name.to_string(),
            mean: 0.0,
            min: 0.0,
            max: 0.0,
            stddev: 0.0,
        };
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    MetricSummary {
        name: name.to_string(),
        mean,
        min,
        max,
        stddev: variance.sqrt(),
    }
}

/// Aggregated metrics in the batch format:
/// `{ "key": { "mean": ..., "min": ..., "max": ..., "stddev": ... }, ... }`
pub fn build_aggregated_metrics(stats: &SummaryStats) -> serde_json::Value {
    let entry = |m: &MetricSummary| {
        serde_json::json!({ "mean": m.mean, "min": m.min, "max": m.max, "stddev": m.stddev })
    };
    let mut map = serde_json::Map::new();
    for metric in &stats.metrics {
        map.insert(metric.name.clone(), entry(metric));
    }
    for occ in &stats.occupancy {
        let mut value = entry(&occ.observed);
        value["expected"] = serde_json::json!(occ.expected);
        map.insert(format!("occupancy.{}", occ.key), value);
    }
    serde_json::Value::Object(map)
}

pub fn print_summary(scenario_name: &str, ticks: u64, stats: &SummaryStats) {
    println!();
    println!(
        "=== {scenario_name}: {} seeds × {ticks} ticks ===",
        stats.seed_count
    );
    println!(
        "{:<28} {:>10} {:>10} {:>10} {:>10}",
        "metric", "mean", "min", "max", "stddev"
    );
    for m in &stats.metrics {
        println!(
            "{:<28} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
            m.name, m.mean, m.min, m.max, m.stddev
        );
    }
    println!();
    println!(
        "{:<28} {:>10} {:>10} {:>10} {:>10}",
        "occupancy", "expected", "mean", "stddev", "drift"
    );
    for occ in &stats.occupancy {
        let (expected, drift) = match occ.expected {
            Some(e) => (format!("{e:.4}"), format!("{:+.4}", occ.observed.mean - e)),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<28} {expected:>10} {:>10.4} {:>10.4} {drift:>10}",
            occ.key, occ.observed.mean, occ.observed.stddev
        );
    }
    if stats.stalled_count > 0 {
        println!(
            "\nWARNING: {}/{} seeds stalled (no weather transitions)",
            stats.stalled_count, stats.seed_count
        );
    }
}

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Descriptive summary of one numeric sample.
///
/// An empty sample yields the all-zero value, so callers must check `count` before trusting
/// the other fields.
#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Coefficient of variation, in percent
    pub cv: f64,
    pub p10: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Stats {
    pub fn calculate(values: &[f64]) -> Self {
        if values.is_empty() {
            return Stats::default();
        }

        let sorted = sorted(values);
        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std_dev = population_stdev(&sorted, mean);
        let cv = if mean != 0.0 {
            std_dev / mean * 100.0
        } else {
            0.0
        };

        Stats {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            median: percentile(&sorted, 50.0),
            std_dev,
            cv,
            p10: percentile(&sorted, 10.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        }
    }
}

pub(crate) fn sorted(values: &[f64]) -> Vec<f64> {
    values.iter().copied().sorted_by(f64::total_cmp).collect()
}

/// Standard deviation over the whole sample (n denominator, not n-1).
fn population_stdev(data: &[f64], mean: f64) -> f64 {
    let variance = data
        .iter()
        .map(|&v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;
    variance.sqrt()
}

/// Percentile `p` (0..=100) of an already sorted sample, with linear interpolation between
/// the two closest ranks at fractional index `p/100 * (n-1)`.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    match sorted_data {
        [] => 0.0,
        [single] => *single,
        _ => {
            let last = sorted_data.len() - 1;
            let idx = (p / 100.0 * last as f64).clamp(0.0, last as f64);
            let lower = idx.floor() as usize;
            let upper = idx.ceil() as usize;
            let frac = idx - lower as f64;
            sorted_data[lower] * (1.0 - frac) + sorted_data[upper] * frac
        }
    }
}

/// Mean of the sample once the lowest and highest `trim_percent`% of values are dropped.
///
/// Falls back to the median when trimming would leave nothing.
pub fn trimmed_mean(values: &[f64], trim_percent: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let sorted = sorted(values);
    let trim_count = (sorted.len() as f64 * trim_percent / 100.0).floor() as usize;
    if trim_count * 2 >= sorted.len() {
        return percentile(&sorted, 50.0);
    }

    let kept = &sorted[trim_count..sorted.len() - trim_count];
    kept.iter().sum::<f64>() / kept.len() as f64
}

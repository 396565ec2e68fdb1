use serde::{Deserialize, Serialize};

use crate::stats::Stats;

/// Above this average coefficient of variation (%), measurements are too noisy to conclude.
const CONCLUSIVE_MAX_CV: f64 = 15.0;
/// At or above this overlap score, the two distributions are too entangled to conclude.
const CONCLUSIVE_MAX_OVERLAP: f64 = 0.3;

/// Verdict of an optimized sample against its baseline.
///
/// A positive gain means the optimized workload is faster. The verdict is a heuristic, not a
/// hypothesis test: it is conclusive when the samples are stable, barely overlap, and the gain
/// keeps its sign across its estimated spread.
#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// Median-based relative gain, in percent
    pub gain_percent: f64,
    pub gain_p10: f64,
    pub gain_p90: f64,
    pub conclusive: bool,
    /// Overlap of the two P10..P90 ranges, in [0, 1]
    pub overlap: f64,
}

impl Comparison {
    /// Compare two duration samples.
    ///
    /// When `alternate` is set and both samples have the same length, runs are paired by index
    /// and the spread of the gain comes from the per-pair gains. Otherwise the spread is
    /// approximated from the coefficients of variation of both samples.
    pub fn compare(baseline: &[f64], optimized: &[f64], alternate: bool) -> Self {
        if baseline.is_empty() || optimized.is_empty() {
            return Comparison::default();
        }

        let baseline_stats = Stats::calculate(baseline);
        let optimized_stats = Stats::calculate(optimized);

        let gain_percent = relative_gain(baseline_stats.median, optimized_stats.median);

        let (gain_p10, gain_p90) = if alternate && baseline.len() == optimized.len() {
            let pairwise_gains: Vec<f64> = baseline
                .iter()
                .zip(optimized)
                .map(|(&base, &opt)| relative_gain(base, opt))
                .collect();
            let pairwise_stats = Stats::calculate(&pairwise_gains);
            (pairwise_stats.p10, pairwise_stats.p90)
        } else {
            // Not a confidence interval: a symmetric band sized by the average noise level
            let half_width = (baseline_stats.cv + optimized_stats.cv) / 2.0;
            (gain_percent - half_width, gain_percent + half_width)
        };

        let overlap = range_overlap(
            (baseline_stats.p10, baseline_stats.p90),
            (optimized_stats.p10, optimized_stats.p90),
        );

        let average_cv = (baseline_stats.cv + optimized_stats.cv) / 2.0;
        let consistent_sign =
            (gain_p10 >= 0.0 && gain_p90 >= 0.0) || (gain_p10 <= 0.0 && gain_p90 <= 0.0);

        Comparison {
            gain_percent,
            gain_p10,
            gain_p90,
            conclusive: average_cv < CONCLUSIVE_MAX_CV
                && overlap < CONCLUSIVE_MAX_OVERLAP
                && consistent_sign,
            overlap,
        }
    }
}

/// Gain of `optimized` over `baseline` in percent, 0 when the baseline is 0.
fn relative_gain(baseline: f64, optimized: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (baseline - optimized) / baseline * 100.0
}

/// Length of the intersection of two ranges divided by the length of their union.
///
/// Disjoint (or merely touching) ranges score 0. Two ranges collapsed onto the same point
/// score 1.
pub(crate) fn range_overlap(a: (f64, f64), b: (f64, f64)) -> f64 {
    let intersection_start = a.0.max(b.0);
    let intersection_end = a.1.min(b.1);
    if intersection_start > intersection_end {
        return 0.0;
    }

    let union = a.1.max(b.1) - a.0.min(b.0);
    if union == 0.0 {
        return 1.0;
    }

    (intersection_end - intersection_start) / union
}

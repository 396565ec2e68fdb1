use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::histogram::Histogram;

/// One heavy off-CPU call stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackTrace {
    pub stack: String,
    pub time_ms: f64,
    /// Share of the total off-CPU time of the run
    pub percent: f64,
}

/// Telemetry snapshot spanning one run's execution window.
///
/// A field is absent when its backend was unavailable or produced no samples, never zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runqueue_latency_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runqlat_histogram: Option<Histogram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offcpu_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offcpu_top_stacks: Option<Vec<StackTrace>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_latency_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biolat_histogram: Option<Histogram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_syscalls: Option<BTreeMap<String, u64>>,
    /// Average latency per call, for each syscall
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syscall_latency_us: Option<BTreeMap<String, f64>>,
}

fn merge_field<T>(into: &mut Option<T>, from: Option<T>) {
    if from.is_some() {
        *into = from;
    }
}

impl Metrics {
    pub fn is_empty(&self) -> bool {
        *self == Metrics::default()
    }

    /// Take the fields `reading` carries. Each sampler only fills its own signal's fields.
    pub fn merge(&mut self, reading: Metrics) {
        merge_field(&mut self.runqueue_latency_us, reading.runqueue_latency_us);
        merge_field(&mut self.runqlat_histogram, reading.runqlat_histogram);
        merge_field(&mut self.offcpu_time_ms, reading.offcpu_time_ms);
        merge_field(&mut self.offcpu_top_stacks, reading.offcpu_top_stacks);
        merge_field(&mut self.io_latency_us, reading.io_latency_us);
        merge_field(&mut self.biolat_histogram, reading.biolat_histogram);
        merge_field(&mut self.top_syscalls, reading.top_syscalls);
        merge_field(&mut self.syscall_latency_us, reading.syscall_latency_us);
    }
}

/// Per-scenario summary of many [`Metrics`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregatedMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runqueue_latency_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offcpu_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_latency_us: Option<f64>,
    #[serde(default)]
    pub top_syscalls: BTreeMap<String, u64>,
}

impl AggregatedMetrics {
    /// The `n` most called syscalls, most called first (ties by name).
    pub fn top_syscalls(&self, n: usize) -> Vec<(&str, u64)> {
        let mut syscalls: Vec<(&str, u64)> = self
            .top_syscalls
            .iter()
            .map(|(name, &count)| (name.as_str(), count))
            .collect();
        syscalls.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        syscalls.truncate(n);
        syscalls
    }
}

/// Mean over the runs that carry the value, `None` when none does.
fn mean_of_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Average each scalar signal over the runs where it is present and sum syscall counts.
///
/// Signals can therefore be averaged over different subsets of runs.
pub fn aggregate(metrics: &[Metrics]) -> AggregatedMetrics {
    let mut top_syscalls = BTreeMap::new();
    for syscalls in metrics.iter().filter_map(|m| m.top_syscalls.as_ref()) {
        for (name, count) in syscalls {
            *top_syscalls.entry(name.clone()).or_default() += count;
        }
    }

    AggregatedMetrics {
        runqueue_latency_us: mean_of_present(metrics.iter().map(|m| m.runqueue_latency_us)),
        offcpu_time_ms: mean_of_present(metrics.iter().map(|m| m.offcpu_time_ms)),
        io_latency_us: mean_of_present(metrics.iter().map(|m| m.io_latency_us)),
        top_syscalls,
    }
}

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use corecut::benchmark::{BenchmarkConfig, BenchmarkOrchestrator};
use corecut::executor::{RunResult, ScriptExecutor, ScriptRunner};
use corecut::telemetry::{Metrics, TelemetrySource, aggregate};
use corecut::MeasurementMode;

const BASELINE_MS: [f64; 9] = [100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 102.0, 98.0, 100.0];
const OPTIMIZED_MS: [f64; 9] = [70.0, 71.0, 69.0, 72.0, 68.0, 70.0, 71.0, 69.0, 70.0];

fn run_result(duration_ms: f64, error: Option<&str>) -> RunResult {
    let start_time = Utc::now();
    RunResult {
        start_time,
        end_time: start_time + chrono::Duration::microseconds((duration_ms * 1000.0) as i64),
        duration_ms,
        exit_code: if error.is_some() { 1 } else { 0 },
        stdout_tail: String::new(),
        stderr_tail: String::new(),
        error: error.map(str::to_string),
        throughput: None,
        pid: 1,
    }
}

/// Replays fixed durations: one queue for the baseline script, one for the optimized script.
struct FakeRunner {
    baseline: RefCell<VecDeque<RunResult>>,
    optimized: RefCell<VecDeque<RunResult>>,
}

impl FakeRunner {
    fn new(baseline: &[f64], optimized: &[f64]) -> Self {
        let queue = |durations: &[f64]| durations.iter().map(|&d| run_result(d, None)).collect();
        FakeRunner {
            baseline: RefCell::new(queue(baseline)),
            optimized: RefCell::new(queue(optimized)),
        }
    }
}

#[async_trait(?Send)]
impl ScriptRunner for FakeRunner {
    async fn run(&self, script: &str, _mode: MeasurementMode) -> Result<RunResult> {
        let queue = match script {
            "baseline.sh" => &self.baseline,
            "optimized.sh" => &self.optimized,
            _ => return Err(anyhow!("unknown script {script}")),
        };
        queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no run left for {script}"))
    }
}

#[derive(Default)]
struct CountingTelemetry {
    started: Cell<u32>,
    stopped: Cell<u32>,
}

#[async_trait(?Send)]
impl TelemetrySource for CountingTelemetry {
    fn start(&self) {
        assert_eq!(self.started.get(), self.stopped.get(), "start while running");
        self.started.set(self.started.get() + 1);
    }

    async fn stop(&self) -> Metrics {
        self.stopped.set(self.stopped.get() + 1);
        Metrics {
            runqueue_latency_us: Some(f64::from(self.stopped.get())),
            ..Default::default()
        }
    }
}

fn config(alternate: bool) -> BenchmarkConfig {
    BenchmarkConfig {
        warmup_runs: 0,
        runs: 9,
        alternate,
        cooldown: Duration::ZERO,
        ..Default::default()
    }
}

#[test_log::test(tokio::test)]
async fn test_alternating_design_detects_thirty_percent_gain() {
    let runner = FakeRunner::new(&BASELINE_MS, &OPTIMIZED_MS);
    let telemetry = CountingTelemetry::default();
    let config = config(true);

    let outcome = BenchmarkOrchestrator::new(&config, &runner, Some(&telemetry))
        .run("baseline.sh", "optimized.sh")
        .await
        .unwrap();

    let comparison = outcome.comparison;
    assert!((comparison.gain_percent - 30.0).abs() < 1e-9);
    assert!(comparison.gain_p10 > 25.0 && comparison.gain_p90 < 35.0);
    assert_eq!(comparison.overlap, 0.0);
    assert!(comparison.conclusive);

    assert_eq!(outcome.baseline.stats.count, 9);
    assert_eq!(outcome.baseline.stats.median, 100.0);
    assert_eq!(outcome.optimized.stats.median, 70.0);

    assert_eq!(telemetry.started.get(), 18);
    assert_eq!(telemetry.stopped.get(), 18);
    assert_eq!(outcome.baseline.telemetry.len(), 9);
    assert_eq!(outcome.optimized.telemetry.len(), 9);
    // Baseline runs are the odd stops of the A/B sequence: 1, 3, ..., 17
    assert_eq!(
        aggregate(&outcome.baseline.telemetry).runqueue_latency_us,
        Some(9.0)
    );
}

#[test_log::test(tokio::test)]
async fn test_block_design_uses_cv_band() {
    let runner = FakeRunner::new(&BASELINE_MS, &OPTIMIZED_MS);
    let config = config(false);

    let outcome = BenchmarkOrchestrator::new(&config, &runner, None)
        .run("baseline.sh", "optimized.sh")
        .await
        .unwrap();

    let comparison = outcome.comparison;
    let half_width = (outcome.baseline.stats.cv + outcome.optimized.stats.cv) / 2.0;
    assert!((comparison.gain_percent - 30.0).abs() < 1e-9);
    assert!((comparison.gain_p10 - (30.0 - half_width)).abs() < 1e-9);
    assert!((comparison.gain_p90 - (30.0 + half_width)).abs() < 1e-9);
    assert!(comparison.conclusive);
    assert!(outcome.baseline.telemetry.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_failed_runs_keep_their_slot() {
    let runner = FakeRunner::new(&BASELINE_MS[..3], &OPTIMIZED_MS[..3]);
    runner.optimized.borrow_mut()[1] = run_result(5.0, Some("timeout"));
    let config = BenchmarkConfig {
        runs: 3,
        ..config(true)
    };

    let outcome = BenchmarkOrchestrator::new(&config, &runner, None)
        .run("baseline.sh", "optimized.sh")
        .await
        .unwrap();

    assert_eq!(outcome.optimized.runs.len(), 3);
    assert_eq!(outcome.optimized.failed_runs(), 1);
    assert_eq!(outcome.optimized.durations(), vec![70.0, 69.0]);
    assert_eq!(outcome.optimized.stats.count, 2);
}

#[test_log::test(tokio::test)]
async fn test_real_workloads() {
    let executor = ScriptExecutor::new(Duration::from_secs(30), Duration::ZERO, vec![]);
    let config = BenchmarkConfig {
        warmup_runs: 1,
        runs: 3,
        cooldown: Duration::ZERO,
        ..Default::default()
    };

    let outcome = BenchmarkOrchestrator::new(&config, &executor, None)
        .run("sleep 0.3", "sleep 0.05")
        .await
        .unwrap();

    assert_eq!(outcome.baseline.durations().len(), 3);
    assert_eq!(outcome.optimized.durations().len(), 3);
    assert!(outcome.baseline.stats.min >= 300.0);
    assert!(outcome.comparison.gain_percent > 0.0);
}

use corecut_stats::{Comparison, Stats};
use serde::{Deserialize, Serialize};

use crate::executor::{RunResult, ScriptRunner, successful_durations};
use crate::prelude::*;
use crate::telemetry::{Metrics, TelemetrySource};

mod config;

pub use config::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    Baseline,
    Optimized,
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioKind::Baseline => write!(f, "baseline"),
            ScenarioKind::Optimized => write!(f, "optimized"),
        }
    }
}

/// How measured runs of the two scenarios are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Design {
    /// A/B/A/B: run `i` of both scenarios can be paired
    Alternating,
    /// All baseline runs, then all optimized runs
    Blocks,
}

impl Design {
    fn group_name(self) -> &'static str {
        match self {
            Design::Alternating => "Measuring (alternating)",
            Design::Blocks => "Measuring (blocks)",
        }
    }
}

/// Every measured run of one scenario, failed ones included, in run order.
#[derive(Debug, Clone, Default)]
pub struct ScenarioResult {
    pub runs: Vec<RunResult>,
    /// One snapshot per run, empty when telemetry is disabled
    pub telemetry: Vec<Metrics>,
    /// Over the successful runs only
    pub stats: Stats,
}

impl ScenarioResult {
    pub fn durations(&self) -> Vec<f64> {
        successful_durations(&self.runs)
    }

    pub fn failed_runs(&self) -> usize {
        self.runs.iter().filter(|run| !run.is_success()).count()
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkOutcome {
    pub baseline: ScenarioResult,
    pub optimized: ScenarioResult,
    pub comparison: Comparison,
}

/// Sequences warmup and measured runs of a baseline and an optimized workload.
pub struct BenchmarkOrchestrator<'a> {
    config: &'a BenchmarkConfig,
    runner: &'a dyn ScriptRunner,
    telemetry: Option<&'a dyn TelemetrySource>,
}

impl<'a> BenchmarkOrchestrator<'a> {
    pub fn new(
        config: &'a BenchmarkConfig,
        runner: &'a dyn ScriptRunner,
        telemetry: Option<&'a dyn TelemetrySource>,
    ) -> Self {
        BenchmarkOrchestrator {
            config,
            runner,
            telemetry,
        }
    }

    pub fn design(&self) -> Design {
        if self.config.alternate {
            Design::Alternating
        } else {
            Design::Blocks
        }
    }

    pub async fn run(&self, baseline_script: &str, optimized_script: &str) -> Result<BenchmarkOutcome> {
        self.config.validate()?;

        if self.config.warmup_runs > 0 {
            start_group!("Warmup");
            self.warmup(baseline_script, optimized_script).await;
            end_group!();
        }

        let mut baseline = ScenarioResult::default();
        let mut optimized = ScenarioResult::default();

        let design = self.design();
        start_group!(design.group_name());
        let measured = match design {
            Design::Alternating => {
                self.measure_alternating(baseline_script, optimized_script, &mut baseline, &mut optimized)
                    .await
            }
            Design::Blocks => {
                self.measure_blocks(baseline_script, optimized_script, &mut baseline, &mut optimized)
                    .await
            }
        };
        end_group!();
        measured?;

        let baseline_durations = baseline.durations();
        let optimized_durations = optimized.durations();
        baseline.stats = Stats::calculate(&baseline_durations);
        optimized.stats = Stats::calculate(&optimized_durations);
        let paired = self.config.alternate && failures_line_up(&baseline.runs, &optimized.runs);
        if self.config.alternate && !paired {
            warn!("Baseline and optimized runs failed in different slots, gains are not paired");
        }
        let comparison = Comparison::compare(&baseline_durations, &optimized_durations, paired);

        for (kind, scenario) in [(ScenarioKind::Baseline, &baseline), (ScenarioKind::Optimized, &optimized)] {
            if scenario.stats.count == 0 {
                warn!("Every measured {kind} run failed, its statistics are empty");
            }
        }

        Ok(BenchmarkOutcome {
            baseline,
            optimized,
            comparison,
        })
    }

    /// Discarded runs without telemetry. Failures are only logged.
    async fn warmup(&self, baseline_script: &str, optimized_script: &str) {
        let total = self.config.warmup_runs;
        for i in 1..=total {
            for (kind, script) in [
                (ScenarioKind::Baseline, baseline_script),
                (ScenarioKind::Optimized, optimized_script),
            ] {
                match self.runner.run(script, self.config.mode).await {
                    Ok(run) => match &run.error {
                        None => debug!("Warmup {kind} {i}/{total}: {:.2} ms", run.duration_ms),
                        Some(error) => warn!("Warmup {kind} {i}/{total} failed: {error}"),
                    },
                    Err(e) => warn!("Warmup {kind} {i}/{total} failed: {e:#}"),
                }
            }
        }
    }

    async fn measure_alternating(
        &self,
        baseline_script: &str,
        optimized_script: &str,
        baseline: &mut ScenarioResult,
        optimized: &mut ScenarioResult,
    ) -> Result<()> {
        for i in 1..=self.config.runs {
            self.measure_once(ScenarioKind::Baseline, baseline_script, i, baseline)
                .await?;
            self.measure_once(ScenarioKind::Optimized, optimized_script, i, optimized)
                .await?;
        }
        Ok(())
    }

    async fn measure_blocks(
        &self,
        baseline_script: &str,
        optimized_script: &str,
        baseline: &mut ScenarioResult,
        optimized: &mut ScenarioResult,
    ) -> Result<()> {
        for i in 1..=self.config.runs {
            self.measure_once(ScenarioKind::Baseline, baseline_script, i, baseline)
                .await?;
        }
        for i in 1..=self.config.runs {
            self.measure_once(ScenarioKind::Optimized, optimized_script, i, optimized)
                .await?;
        }
        Ok(())
    }

    /// One measured run bracketed by telemetry. Only a launch failure is an error.
    async fn measure_once(
        &self,
        kind: ScenarioKind,
        script: &str,
        iteration: u32,
        scenario: &mut ScenarioResult,
    ) -> Result<()> {
        if let Some(telemetry) = self.telemetry {
            telemetry.start();
        }

        let run = self.runner.run(script, self.config.mode).await;

        // Stopped even when the launch failed, so no sampler outlives the benchmark
        let metrics = match self.telemetry {
            Some(telemetry) => Some(telemetry.stop().await),
            None => None,
        };

        let run = run.with_context(|| format!("Failed to run the {kind} scenario"))?;
        let runs = self.config.runs;
        match &run.error {
            None => info!("[{iteration}/{runs}] {kind}: {:.2} ms", run.duration_ms),
            Some(error) => warn!("[{iteration}/{runs}] {kind}: FAILED ({error})"),
        }

        scenario.runs.push(run);
        scenario.telemetry.extend(metrics);
        Ok(())
    }
}

/// Whether dropping failed runs keeps run `i` of both scenarios aligned.
fn failures_line_up(baseline: &[RunResult], optimized: &[RunResult]) -> bool {
    baseline.len() == optimized.len()
        && baseline
            .iter()
            .zip(optimized)
            .all(|(base, opt)| base.is_success() == opt.is_success())
}

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use corecut_stats::{Comparison, Stats};
use serde::{Deserialize, Serialize};

use crate::benchmark::{BenchmarkConfig, BenchmarkOutcome, ScenarioResult};
use crate::executor::RunResult;
use crate::measurement_mode::MeasurementMode;
use crate::prelude::*;
use crate::system::SystemInfo;
use crate::telemetry::{AggregatedMetrics, Metrics, aggregate};

mod aggregate;

pub use aggregate::{AGGREGATE_FILE_NAME, AggregateReport, AggregateStats, load_reports};

pub const REPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportConfig {
    pub baseline_script: String,
    pub optimized_script: String,
    pub mode: MeasurementMode,
    pub warmup_runs: u32,
    pub measured_runs: u32,
    pub alternate: bool,
    pub cooldown_ms: u64,
    pub timeout_ms: u64,
    #[serde(default)]
    pub telemetry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioReport {
    pub script: String,
    pub runs: Vec<RunResult>,
    pub stats: Stats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub telemetry: Vec<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_summary: Option<AggregatedMetrics>,
}

impl ScenarioReport {
    fn new(script: &str, scenario: ScenarioResult) -> Self {
        let telemetry_summary = (!scenario.telemetry.is_empty()).then(|| aggregate(&scenario.telemetry));
        ScenarioReport {
            script: script.to_string(),
            runs: scenario.runs,
            stats: scenario.stats,
            telemetry: scenario.telemetry,
            telemetry_summary,
        }
    }
}

/// Everything measured by one benchmark on one machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub machine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub system: SystemInfo,
    pub config: ReportConfig,
    pub baseline: ScenarioReport,
    pub optimized: ScenarioReport,
    pub comparison: Comparison,
}

pub struct ReportBuilder<'a> {
    pub machine: &'a str,
    pub tag: Option<&'a str>,
    pub system: SystemInfo,
    pub config: &'a BenchmarkConfig,
    pub baseline_script: &'a str,
    pub optimized_script: &'a str,
    pub telemetry: bool,
}

impl ReportBuilder<'_> {
    pub fn build(self, outcome: BenchmarkOutcome) -> Report {
        Report {
            version: REPORT_VERSION.to_string(),
            generated_at: Utc::now(),
            machine: self.machine.to_string(),
            tag: self.tag.map(str::to_string),
            system: self.system,
            config: ReportConfig {
                baseline_script: self.baseline_script.to_string(),
                optimized_script: self.optimized_script.to_string(),
                mode: self.config.mode,
                warmup_runs: self.config.warmup_runs,
                measured_runs: self.config.runs,
                alternate: self.config.alternate,
                cooldown_ms: self.config.cooldown.as_millis() as u64,
                timeout_ms: self.config.timeout.as_millis() as u64,
                telemetry: self.telemetry,
            },
            baseline: ScenarioReport::new(self.baseline_script, outcome.baseline),
            optimized: ScenarioReport::new(self.optimized_script, outcome.optimized),
            comparison: outcome.comparison,
        }
    }
}

/// Keep file names portable whatever the machine is called.
fn sanitize_file_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Report {
    /// `report_<machine>_<timestamp>.json`
    pub fn file_name(&self) -> String {
        format!(
            "report_{}_{}.json",
            sanitize_file_component(&self.machine),
            self.generated_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write the report as pretty JSON into `output_dir`, creating it if needed.
    pub fn write_to(&self, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create the output directory {}", output_dir.display())
        })?;
        let path = output_dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write the report to {}", path.display()))?;
        Ok(path)
    }
}

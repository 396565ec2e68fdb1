use std::time::Duration;

use crate::measurement_mode::MeasurementMode;
use crate::prelude::*;

pub const DEFAULT_WARMUP_RUNS: u32 = 1;
pub const DEFAULT_RUNS: u32 = 9;
pub const DEFAULT_ALTERNATE: bool = true;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);

/// Parameters of one benchmark, fixed once it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    /// Discarded runs of each scenario before measuring
    pub warmup_runs: u32,
    /// Measured runs of each scenario
    pub runs: u32,
    /// Interleave baseline and optimized runs instead of running them in blocks
    pub alternate: bool,
    pub timeout: Duration,
    pub cooldown: Duration,
    pub mode: MeasurementMode,
    /// Applied on top of the inherited environment of every workload
    pub env_overrides: Vec<(String, String)>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            warmup_runs: DEFAULT_WARMUP_RUNS,
            runs: DEFAULT_RUNS,
            alternate: DEFAULT_ALTERNATE,
            timeout: DEFAULT_TIMEOUT,
            cooldown: DEFAULT_COOLDOWN,
            mode: MeasurementMode::default(),
            env_overrides: vec![],
        }
    }
}

impl BenchmarkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.runs == 0 {
            bail!("At least one measured run is required");
        }
        if self.timeout.is_zero() {
            bail!("The run timeout must be greater than zero");
        }
        Ok(())
    }
}

/// How a bare number (no unit) is read when parsing a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BareNumberUnit {
    Seconds,
    Milliseconds,
}

/// Parse a duration given as a humantime string ("500ms", "1.5s", "2m") or a bare number.
pub fn parse_duration(s: &str, bare_unit: BareNumberUnit) -> Result<Duration> {
    let s = s.trim();

    if let Ok(value) = s.parse::<f64>() {
        let seconds = match bare_unit {
            BareNumberUnit::Seconds => value,
            BareNumberUnit::Milliseconds => value / 1000.0,
        };
        return Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("Invalid duration: '{s}'"));
    }

    humantime::parse_duration(s).with_context(|| {
        format!("Invalid duration format: '{s}'. Expected format like '500ms', '1s', '2m' or a number")
    })
}

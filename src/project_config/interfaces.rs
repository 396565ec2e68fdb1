use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::benchmark::{BareNumberUnit, parse_duration};
use crate::measurement_mode::MeasurementMode;
use crate::prelude::*;

/// Project-level configuration from a corecut.yaml file
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    /// Path of the baseline workload script
    pub baseline: Option<String>,
    /// Path of the optimized workload script
    pub optimized: Option<String>,
    /// Default options of the `run` command
    pub options: Option<ProjectOptions>,
}

#[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectOptions {
    pub warmup_runs: Option<u32>,
    pub runs: Option<u32>,
    pub alternate: Option<bool>,
    /// Pause after every run; a bare number is in milliseconds
    pub cooldown: Option<DurationSetting>,
    /// Per-run timeout; a bare number is in seconds
    pub timeout: Option<DurationSetting>,
    pub mode: Option<MeasurementMode>,
    /// Relative to the directory corecut is started from
    pub env_file: Option<String>,
    /// Directory where reports are written
    pub output: Option<String>,
    pub telemetry: Option<bool>,
}

/// A duration written either as a humantime string or as a bare YAML number.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum DurationSetting {
    Number(f64),
    Text(String),
}

impl DurationSetting {
    pub fn to_duration(&self, bare_unit: BareNumberUnit) -> Result<Duration> {
        parse_duration(&self.to_string(), bare_unit)
    }
}

impl std::fmt::Display for DurationSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurationSetting::Number(value) => write!(f, "{value}"),
            DurationSetting::Text(text) => write!(f, "{text}"),
        }
    }
}

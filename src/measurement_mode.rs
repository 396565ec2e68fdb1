use clap::ValueEnum;
use serde::Deserialize;
use serde::Serialize;

/// What a workload run is measured by.
#[derive(ValueEnum, Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementMode {
    /// Wall-clock duration measured around the process
    #[default]
    Duration,
    /// Duration plus the throughput value the workload prints last
    Throughput,
}

impl std::fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasurementMode::Duration => write!(f, "duration"),
            MeasurementMode::Throughput => write!(f, "throughput"),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error tag of a run killed because it exceeded its timeout.
pub const TIMEOUT_ERROR: &str = "timeout";

/// One executed workload invocation.
///
/// `duration_ms` always comes from the harness clock around spawn and wait. `throughput` is
/// whatever the workload printed, when measured in throughput mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: f64,
    /// -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout_tail: String,
    pub stderr_tail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<f64>,
    pub pid: u32,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some(TIMEOUT_ERROR)
    }
}

/// Durations of the runs that carry no error tag, in run order.
pub fn successful_durations(runs: &[RunResult]) -> Vec<f64> {
    runs.iter()
        .filter(|run| run.is_success())
        .map(|run| run.duration_ms)
        .collect()
}

#[cfg(test)]
impl RunResult {
    pub fn test(duration_ms: f64, error: Option<&str>) -> Self {
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
            pid: 4242,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_runs_are_excluded_from_durations() {
        let runs = vec![
            RunResult::test(100.0, None),
            RunResult::test(5.0, Some(TIMEOUT_ERROR)),
            RunResult::test(102.0, None),
            RunResult::test(1.0, Some("exit status 3")),
        ];

        assert_eq!(successful_durations(&runs), vec![100.0, 102.0]);
        assert!(runs[1].is_timeout());
        assert!(!runs[3].is_timeout());
    }

    #[test]
    fn test_absent_optionals_are_not_serialized() {
        let json = serde_json::to_value(RunResult::test(1.0, None)).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("error"));
        assert!(!object.contains_key("throughput"));
        assert!(object.contains_key("stdout_tail"));
        assert!(object.contains_key("start_time"));
    }
}

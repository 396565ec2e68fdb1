use std::path::PathBuf;

use crate::cli::run::RunArgs;

use super::ProjectConfig;

/// Handles merging of CLI arguments with project configuration
///
/// Implements the precedence rule: CLI > config > None. Built-in defaults are applied later,
/// when the merged arguments are turned into a benchmark configuration.
pub struct ConfigMerger;

impl ConfigMerger {
    pub fn merge_run_args(cli: &RunArgs, config: &ProjectConfig) -> RunArgs {
        let options = config.options.as_ref();
        let cooldown = options
            .and_then(|o| o.cooldown.as_ref())
            .map(ToString::to_string);
        let timeout = options
            .and_then(|o| o.timeout.as_ref())
            .map(ToString::to_string);

        RunArgs {
            baseline: Self::merge_option(&cli.baseline, config.baseline.as_ref()),
            optimized: Self::merge_option(&cli.optimized, config.optimized.as_ref()),
            runs: cli.runs.or(options.and_then(|o| o.runs)),
            warmup_runs: cli.warmup_runs.or(options.and_then(|o| o.warmup_runs)),
            alternate: cli.alternate.or(options.and_then(|o| o.alternate)),
            cooldown: Self::merge_option(&cli.cooldown, cooldown.as_ref()),
            timeout: Self::merge_option(&cli.timeout, timeout.as_ref()),
            mode: cli.mode.or(options.and_then(|o| o.mode)),
            env_file: cli.env_file.clone().or_else(|| {
                options
                    .and_then(|o| o.env_file.as_ref())
                    .map(PathBuf::from)
            }),
            tag: cli.tag.clone(),
            machine: cli.machine.clone(),
            output: Self::merge_option(&cli.output, options.and_then(|o| o.output.as_ref())),
            // The config file can only turn telemetry off
            no_telemetry: cli.no_telemetry || options.and_then(|o| o.telemetry) == Some(false),
        }
    }

    /// Helper to merge Option values with precedence: CLI > config > None
    fn merge_option<T: Clone>(cli_value: &Option<T>, config_value: Option<&T>) -> Option<T> {
        cli_value.clone().or_else(|| config_value.cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement_mode::MeasurementMode;
    use crate::project_config::{DurationSetting, ProjectOptions};

    fn project_config() -> ProjectConfig {
        ProjectConfig {
            baseline: Some("./config-baseline.sh".to_string()),
            optimized: Some("./config-optimized.sh".to_string()),
            options: Some(ProjectOptions {
                warmup_runs: Some(3),
                runs: Some(21),
                alternate: Some(false),
                cooldown: Some(DurationSetting::Number(200.0)),
                timeout: Some(DurationSetting::Text("90s".to_string())),
                mode: Some(MeasurementMode::Throughput),
                env_file: Some("bench.env".to_string()),
                output: Some("./config-reports".to_string()),
                telemetry: Some(true),
            }),
        }
    }

    #[test]
    fn test_merge_all_from_cli() {
        let cli = RunArgs {
            baseline: Some("./a.sh".to_string()),
            optimized: Some("./b.sh".to_string()),
            runs: Some(5),
            warmup_runs: Some(0),
            alternate: Some(true),
            cooldown: Some("1s".to_string()),
            timeout: Some("10".to_string()),
            mode: Some(MeasurementMode::Duration),
            env_file: Some(PathBuf::from("cli.env")),
            tag: Some("v2".to_string()),
            machine: Some("m1".to_string()),
            output: Some("./out".to_string()),
            no_telemetry: true,
        };

        let merged = ConfigMerger::merge_run_args(&cli, &project_config());

        assert_eq!(merged.baseline, Some("./a.sh".to_string()));
        assert_eq!(merged.optimized, Some("./b.sh".to_string()));
        assert_eq!(merged.runs, Some(5));
        assert_eq!(merged.warmup_runs, Some(0));
        assert_eq!(merged.alternate, Some(true));
        assert_eq!(merged.cooldown, Some("1s".to_string()));
        assert_eq!(merged.timeout, Some("10".to_string()));
        assert_eq!(merged.mode, Some(MeasurementMode::Duration));
        assert_eq!(merged.env_file, Some(PathBuf::from("cli.env")));
        assert_eq!(merged.output, Some("./out".to_string()));
        assert!(merged.no_telemetry);
    }

    #[test]
    fn test_merge_all_from_config() {
        let merged = ConfigMerger::merge_run_args(&RunArgs::default(), &project_config());

        assert_eq!(merged.baseline, Some("./config-baseline.sh".to_string()));
        assert_eq!(merged.optimized, Some("./config-optimized.sh".to_string()));
        assert_eq!(merged.runs, Some(21));
        assert_eq!(merged.warmup_runs, Some(3));
        assert_eq!(merged.alternate, Some(false));
        assert_eq!(merged.cooldown, Some("200".to_string()));
        assert_eq!(merged.timeout, Some("90s".to_string()));
        assert_eq!(merged.mode, Some(MeasurementMode::Throughput));
        assert_eq!(merged.env_file, Some(PathBuf::from("bench.env")));
        assert_eq!(merged.output, Some("./config-reports".to_string()));
        assert!(!merged.no_telemetry);
    }

    #[test]
    fn test_merged_config_keeps_bare_number_units() {
        let merged = ConfigMerger::merge_run_args(&RunArgs::default(), &project_config());
        let config = merged.benchmark_config().unwrap();

        assert_eq!(config.cooldown, std::time::Duration::from_millis(200));
        assert_eq!(config.timeout, std::time::Duration::from_secs(90));
        assert_eq!(config.runs, 21);
    }

    #[test]
    fn test_config_can_disable_telemetry() {
        let config = ProjectConfig {
            options: Some(ProjectOptions {
                telemetry: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = ConfigMerger::merge_run_args(&RunArgs::default(), &config);

        assert!(merged.no_telemetry);
    }

    #[test]
    fn test_merge_without_options() {
        let cli = RunArgs {
            runs: Some(7),
            ..Default::default()
        };
        let config = ProjectConfig {
            baseline: Some("./base.sh".to_string()),
            ..Default::default()
        };

        let merged = ConfigMerger::merge_run_args(&cli, &config);

        assert_eq!(merged.baseline, Some("./base.sh".to_string()));
        assert_eq!(merged.optimized, None);
        assert_eq!(merged.runs, Some(7));
        assert_eq!(merged.cooldown, None);
        assert!(!merged.no_telemetry);
    }
}

use std::path::{Path, PathBuf};

use clap::Args;

use super::display;
use crate::benchmark::{BareNumberUnit, BenchmarkConfig, BenchmarkOrchestrator, parse_duration};
use crate::executor::ScriptExecutor;
use crate::helpers::env_file::load_env_file;
use crate::measurement_mode::MeasurementMode;
use crate::prelude::*;
use crate::project_config::ProjectConfig;
use crate::project_config::merger::ConfigMerger;
use crate::report::ReportBuilder;
use crate::system::{SystemInfo, default_machine_name};
use crate::telemetry::{TelemetryCollector, TelemetrySource};

pub const DEFAULT_OUTPUT_DIR: &str = "./reports";

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path of the baseline workload script
    #[arg(short, long, env = "CORECUT_BASELINE")]
    pub baseline: Option<String>,

    /// Path of the optimized workload script
    #[arg(short, long, env = "CORECUT_OPTIMIZED")]
    pub optimized: Option<String>,

    /// Number of measured runs per scenario [default: 9]
    #[arg(short, long, env = "CORECUT_RUNS")]
    pub runs: Option<u32>,

    /// Number of discarded warmup runs per scenario [default: 1]
    #[arg(short, long = "warmup", env = "CORECUT_WARMUP")]
    pub warmup_runs: Option<u32>,

    /// Alternate baseline and optimized runs (A/B/A/B) instead of running them in blocks
    /// [default: true]
    #[arg(short, long, env = "CORECUT_ALTERNATE")]
    pub alternate: Option<bool>,

    /// Pause after every run, e.g. "500ms" or "1s". A bare number is in milliseconds
    /// [default: 500ms]
    #[arg(long, env = "CORECUT_COOLDOWN")]
    pub cooldown: Option<String>,

    /// Maximum duration of one run, e.g. "90s" or "5m". A bare number is in seconds
    /// [default: 300s]
    #[arg(short, long, env = "CORECUT_TIMEOUT")]
    pub timeout: Option<String>,

    /// What a run is measured by [default: duration]
    #[arg(short, long, value_enum, env = "CORECUT_MODE")]
    pub mode: Option<MeasurementMode>,

    /// File of KEY=VALUE lines applied to the environment of every run
    #[arg(long, env = "CORECUT_ENV_FILE")]
    pub env_file: Option<PathBuf>,

    /// Free-form label stored in the report, e.g. a commit hash or a branch
    #[arg(long, env = "CORECUT_TAG")]
    pub tag: Option<String>,

    /// Name of the machine in the report [default: host name]
    #[arg(long, env = "CORECUT_MACHINE")]
    pub machine: Option<String>,

    /// Directory where the report is written [default: ./reports]
    #[arg(long, env = "CORECUT_OUTPUT")]
    pub output: Option<String>,

    /// Do not collect kernel telemetry, even when running as root
    #[arg(long, env = "CORECUT_NO_TELEMETRY")]
    pub no_telemetry: bool,
}

impl RunArgs {
    /// Merge CLI args with project config if available
    ///
    /// CLI arguments take precedence over config values.
    pub fn merge_with_project_config(self, project_config: Option<&ProjectConfig>) -> Self {
        match project_config {
            Some(project_config) => ConfigMerger::merge_run_args(&self, project_config),
            None => self,
        }
    }

    /// Resolve the benchmark parameters, falling back to the defaults for unset values.
    pub fn benchmark_config(&self) -> Result<BenchmarkConfig> {
        let defaults = BenchmarkConfig::default();

        let cooldown = match &self.cooldown {
            Some(cooldown) => parse_duration(cooldown, BareNumberUnit::Milliseconds)
                .context("Invalid cooldown")?,
            None => defaults.cooldown,
        };
        let timeout = match &self.timeout {
            Some(timeout) => {
                parse_duration(timeout, BareNumberUnit::Seconds).context("Invalid timeout")?
            }
            None => defaults.timeout,
        };
        let env_overrides = self
            .env_file
            .as_deref()
            .map(load_env_file)
            .unwrap_or_default();

        let config = BenchmarkConfig {
            warmup_runs: self.warmup_runs.unwrap_or(defaults.warmup_runs),
            runs: self.runs.unwrap_or(defaults.runs),
            alternate: self.alternate.unwrap_or(defaults.alternate),
            timeout,
            cooldown,
            mode: self.mode.unwrap_or(defaults.mode),
            env_overrides,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn output_dir(&self) -> PathBuf {
        // A ~ may reach us unexpanded from the config file or an env var
        let output = self.output.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR);
        PathBuf::from(shellexpand::tilde(output).as_ref())
    }
}

fn require_script(script: Option<&str>, scenario: &str) -> Result<String> {
    let script = script.ok_or_else(|| {
        anyhow!("No {scenario} script provided, use --{scenario} or set `{scenario}` in corecut.yaml")
    })?;
    if !Path::new(script).exists() {
        bail!("The {scenario} script was not found: {script}");
    }
    Ok(script.to_string())
}

pub async fn run(args: RunArgs, project_config: Option<&ProjectConfig>) -> Result<()> {
    let args = args.merge_with_project_config(project_config);

    let baseline_script = require_script(args.baseline.as_deref(), "baseline")?;
    let optimized_script = require_script(args.optimized.as_deref(), "optimized")?;
    let config = args.benchmark_config()?;
    let machine = args.machine.clone().unwrap_or_else(default_machine_name);
    debug!("config: {config:#?}");

    display::print_configuration(
        &machine,
        &baseline_script,
        &optimized_script,
        &config,
        args.tag.as_deref(),
    );

    let collector = (!args.no_telemetry).then(TelemetryCollector::new);
    let telemetry: Option<&dyn TelemetrySource> = match &collector {
        Some(collector) if collector.is_available() => {
            info!("Telemetry collection enabled");
            Some(collector)
        }
        Some(collector) => {
            warn!(
                "Telemetry collection disabled: {}",
                collector.availability()
            );
            None
        }
        None => {
            info!("Telemetry collection disabled by --no-telemetry");
            None
        }
    };

    let executor = ScriptExecutor::new(
        config.timeout,
        config.cooldown,
        config.env_overrides.clone(),
    );
    let orchestrator = BenchmarkOrchestrator::new(&config, &executor, telemetry);
    let outcome = orchestrator.run(&baseline_script, &optimized_script).await?;

    let system = SystemInfo::new().unwrap_or_else(|e| {
        warn!("Failed to collect system information: {e}");
        SystemInfo::default()
    });
    let report = ReportBuilder {
        machine: &machine,
        tag: args.tag.as_deref(),
        system,
        config: &config,
        baseline_script: &baseline_script,
        optimized_script: &optimized_script,
        telemetry: telemetry.is_some(),
    }
    .build(outcome);

    display::print_results(&report);

    let path = report.write_to(&args.output_dir())?;
    info!("Report written to {}", path.display());

    Ok(())
}

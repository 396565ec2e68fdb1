mod aggregate;
mod check_deps;
pub(crate) mod display;
pub(crate) mod run;

use std::path::PathBuf;

use crate::{
    VERSION,
    local_logger::{CORECUT_U8_COLOR_CODE, init_local_logger},
    prelude::*,
    project_config::ProjectConfig,
};
use clap::{
    Parser, Subcommand,
    builder::{Styles, styling},
};

fn create_styles() -> Styles {
    styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(
            styling::Ansi256Color(CORECUT_U8_COLOR_CODE).on_default() | styling::Effects::BOLD,
        )
        .placeholder(styling::AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "A/B performance measurement of a baseline and an optimized workload",
    styles = create_styles()
)]
pub struct Cli {
    /// Path to project configuration file (corecut.yaml)
    /// If provided, loads config from this path. Otherwise, looks for corecut.yaml,
    /// corecut.yml or .corecut.yaml in the current directory.
    #[arg(long, global = true, env = "CORECUT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Benchmark a baseline and an optimized workload on this machine and write a report
    #[command(alias = "r")]
    Run(Box<run::RunArgs>),
    /// Combine the reports of several machines into one cross-machine gain estimate
    Aggregate(aggregate::AggregateArgs),
    /// Show which telemetry backends are usable on this machine
    CheckDeps,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_local_logger()?;
    debug!("corecut v{VERSION}");

    match cli.command {
        Commands::Run(args) => {
            let project_config =
                ProjectConfig::discover_and_load(cli.config.as_deref(), &std::env::current_dir()?)?;
            run::run(*args, project_config.as_ref()).await?
        }
        Commands::Aggregate(args) => aggregate::run(args)?,
        Commands::CheckDeps => check_deps::run()?,
    }
    Ok(())
}

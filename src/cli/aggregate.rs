use std::path::PathBuf;

use clap::Args;

use super::display;
use crate::prelude::*;
use crate::report::{AggregateReport, load_reports};

#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Folder containing the reports of every machine, searched recursively
    pub folder: PathBuf,

    /// Directory where aggregate.json is written [default: the reports folder]
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: AggregateArgs) -> Result<()> {
    let reports = load_reports(&args.folder)?;
    info!("Loaded {} reports", reports.len());

    let aggregate = AggregateReport::new(reports);
    display::print_aggregate(&aggregate);

    let output_dir = args.output.as_deref().unwrap_or(&args.folder);
    let path = aggregate.write_to(output_dir)?;
    info!("Aggregate report written to {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::AGGREGATE_FILE_NAME;
    use crate::report::tests::report;

    #[test]
    fn test_aggregate_writes_next_to_reports_by_default() {
        let dir = tempfile::tempdir().unwrap();
        for machine in ["a", "b"] {
            report(machine, &[100.0], &[80.0])
                .write_to(&dir.path().join(machine))
                .unwrap();
        }

        run(AggregateArgs {
            folder: dir.path().to_path_buf(),
            output: None,
        })
        .unwrap();

        let aggregate: AggregateReport = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(AGGREGATE_FILE_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(aggregate.machine_count, 2);
    }

    #[test]
    fn test_aggregate_of_empty_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");

        let result = run(AggregateArgs {
            folder: dir.path().to_path_buf(),
            output: Some(output.clone()),
        });

        assert!(result.is_err());
        assert!(!output.exists());
    }
}

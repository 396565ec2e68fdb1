use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use corecut_stats::Stats;
use serde::{Deserialize, Serialize};

use super::{REPORT_VERSION, Report};
use crate::prelude::*;

pub const AGGREGATE_FILE_NAME: &str = "aggregate.json";

/// Distribution of the per-machine gains, in percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct AggregateStats {
    pub median_gain: f64,
    pub mean_gain: f64,
    pub std_dev_gain: f64,
    pub p10_gain: f64,
    pub p90_gain: f64,
    pub min_gain: f64,
    pub max_gain: f64,
}

impl From<Stats> for AggregateStats {
    fn from(stats: Stats) -> Self {
        AggregateStats {
            median_gain: stats.median,
            mean_gain: stats.mean,
            std_dev_gain: stats.std_dev,
            p10_gain: stats.p10,
            p90_gain: stats.p90,
            min_gain: stats.min,
            max_gain: stats.max,
        }
    }
}

/// Per-machine reports combined into one cross-machine view.
///
/// Only the relative gains are combined, raw durations of different machines are never compared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateReport {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub machine_count: usize,
    pub reports: Vec<Report>,
    pub aggregate_stats: AggregateStats,
}

impl AggregateReport {
    pub fn new(reports: Vec<Report>) -> Self {
        let gains: Vec<f64> = reports.iter().map(|r| r.comparison.gain_percent).collect();
        AggregateReport {
            version: REPORT_VERSION.to_string(),
            generated_at: Utc::now(),
            machine_count: reports.len(),
            aggregate_stats: Stats::calculate(&gains).into(),
            reports,
        }
    }

    pub fn write_to(&self, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create the output directory {}", output_dir.display())
        })?;
        let path = output_dir.join(AGGREGATE_FILE_NAME);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write the aggregate report to {}", path.display()))?;
        Ok(path)
    }
}

fn collect_report_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to scan the reports folder {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        // Symlinked directories are not followed, so a link loop cannot recurse forever
        if entry.file_type()?.is_dir() {
            collect_report_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "json")
            && path.file_name().is_some_and(|name| name != AGGREGATE_FILE_NAME)
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Load every report found under `folder`, recursively.
///
/// Files that cannot be read or parsed are skipped with a warning. Finding no report at all is
/// an error.
pub fn load_reports(folder: &Path) -> Result<Vec<Report>> {
    let mut files = vec![];
    collect_report_files(folder, &mut files)?;
    files.sort();

    if files.is_empty() {
        bail!("No JSON reports found in {}", folder.display());
    }
    debug!("Found {} report files", files.len());

    let mut reports = vec![];
    for path in files {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!("Skipping {}: {err}", path.display());
                continue;
            }
        };
        match serde_json::from_str::<Report>(&content) {
            Ok(report) => {
                info!(
                    "Loaded {} (machine: {}, gain: {:.2}%)",
                    path.display(),
                    report.machine,
                    report.comparison.gain_percent
                );
                reports.push(report);
            }
            Err(err) => warn!("Skipping {}: invalid report ({err})", path.display()),
        }
    }

    if reports.is_empty() {
        bail!("No valid reports could be loaded from {}", folder.display());
    }

    Ok(reports)
}

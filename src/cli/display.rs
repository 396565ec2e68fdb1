use console::style;
use corecut_stats::{Comparison, Stats};
use tabled::settings::object::{Columns, Rows};
use tabled::settings::panel::Panel;
use tabled::settings::style::HorizontalLine;
use tabled::settings::{Alignment, Color, Modify, Style};
use tabled::{Table, Tabled};

use crate::benchmark::BenchmarkConfig;
use crate::measurement_mode::MeasurementMode;
use crate::prelude::*;
use crate::report::{AggregateReport, Report, ScenarioReport};
use crate::telemetry::AggregatedMetrics;

const TOP_SYSCALLS: usize = 5;

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Baseline")]
    baseline: String,
    #[tabled(rename = "Optimized")]
    optimized: String,
}

impl MetricRow {
    fn new(metric: &str, baseline: String, optimized: String) -> Self {
        MetricRow {
            metric: metric.to_string(),
            baseline,
            optimized,
        }
    }
}

#[derive(Tabled)]
struct MachineRow {
    #[tabled(rename = "Machine")]
    machine: String,
    #[tabled(rename = "Gain")]
    gain: String,
    #[tabled(rename = "Baseline (ms)")]
    baseline: String,
    #[tabled(rename = "Optimized (ms)")]
    optimized: String,
    #[tabled(rename = "Verdict")]
    verdict: String,
    #[tabled(rename = "Tag")]
    tag: String,
}

fn build_table_with_style<T: Tabled>(rows: &[T], title: &str) -> String {
    // Line after panel header: use ┬ to connect with columns below
    let header_line = HorizontalLine::full('─', '┬', '├', '┤');
    // Line after column headers: keep intersection
    let column_line = HorizontalLine::inherit(Style::modern());

    let title_style = Color::BOLD | Color::rgb_fg(0, 175, 175);
    let title = title_style.colorize(title.to_string());

    let mut table = Table::new(rows);
    table
        .with(Panel::header(title))
        .with(
            Style::rounded()
                .remove_horizontals()
                .intersection_top('─')
                .horizontals([(1, header_line), (2, column_line)]),
        )
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .with(Modify::new(Rows::new(1..2)).with(Color::BOLD))
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()));
    table.to_string()
}

fn ms(value: f64) -> String {
    format!("{value:.2} ms")
}

fn throughput_stats(scenario: &ScenarioReport) -> Stats {
    let values: Vec<f64> = scenario
        .runs
        .iter()
        .filter(|run| run.is_success())
        .filter_map(|run| run.throughput)
        .collect();
    Stats::calculate(&values)
}

pub fn build_results_table(report: &Report) -> String {
    let (baseline, optimized) = (&report.baseline.stats, &report.optimized.stats);
    let mut rows = vec![
        MetricRow::new("Median", ms(baseline.median), ms(optimized.median)),
        MetricRow::new("Mean", ms(baseline.mean), ms(optimized.mean)),
        MetricRow::new("Std Dev", ms(baseline.std_dev), ms(optimized.std_dev)),
        MetricRow::new(
            "CV",
            format!("{:.2}%", baseline.cv),
            format!("{:.2}%", optimized.cv),
        ),
        MetricRow::new("P10", ms(baseline.p10), ms(optimized.p10)),
        MetricRow::new("P90", ms(baseline.p90), ms(optimized.p90)),
        MetricRow::new(
            "Successful runs",
            format!("{}/{}", baseline.count, report.baseline.runs.len()),
            format!("{}/{}", optimized.count, report.optimized.runs.len()),
        ),
    ];

    if report.config.mode == MeasurementMode::Throughput {
        rows.push(MetricRow::new(
            "Throughput (median)",
            format!("{:.2}", throughput_stats(&report.baseline).median),
            format!("{:.2}", throughput_stats(&report.optimized).median),
        ));
    }

    build_table_with_style(&rows, "Results")
}

pub fn format_gain(comparison: &Comparison, baseline: &Stats, optimized: &Stats) -> String {
    let gain = format!("{:.2}%", comparison.gain_percent);
    let gain = if comparison.gain_percent >= 0.0 {
        style(gain).green().bold()
    } else {
        style(gain).red().bold()
    };
    format!(
        "Gain: {gain} (median {} -> {}), P10/P90 of gain: {:.2}% / {:.2}%",
        ms(baseline.median),
        ms(optimized.median),
        comparison.gain_p10,
        comparison.gain_p90
    )
}

pub fn format_verdict(comparison: &Comparison) -> String {
    if comparison.conclusive {
        format!(
            "{} (stable measurements, overlap {:.2})",
            style("Conclusive").green().bold(),
            comparison.overlap
        )
    } else {
        format!(
            "{} (high variance or overlap {:.2})",
            style("Inconclusive").yellow().bold(),
            comparison.overlap
        )
    }
}

fn format_syscalls(metrics: &AggregatedMetrics) -> String {
    metrics
        .top_syscalls(TOP_SYSCALLS)
        .iter()
        .map(|(name, count)| format!("{name}:{count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Aggregated telemetry of both scenarios, `None` when nothing was collected.
pub fn build_telemetry_table(
    baseline: &AggregatedMetrics,
    optimized: &AggregatedMetrics,
) -> Option<String> {
    let value = |v: Option<f64>, unit: &str| match v {
        Some(v) => format!("{v:.2} {unit}"),
        None => "-".to_string(),
    };

    let mut rows = vec![];
    if baseline.runqueue_latency_us.is_some() || optimized.runqueue_latency_us.is_some() {
        rows.push(MetricRow::new(
            "Runqueue latency (avg)",
            value(baseline.runqueue_latency_us, "µs"),
            value(optimized.runqueue_latency_us, "µs"),
        ));
    }
    if baseline.offcpu_time_ms.is_some() || optimized.offcpu_time_ms.is_some() {
        rows.push(MetricRow::new(
            "Off-CPU time (avg)",
            value(baseline.offcpu_time_ms, "ms"),
            value(optimized.offcpu_time_ms, "ms"),
        ));
    }
    if baseline.io_latency_us.is_some() || optimized.io_latency_us.is_some() {
        rows.push(MetricRow::new(
            "I/O latency (avg)",
            value(baseline.io_latency_us, "µs"),
            value(optimized.io_latency_us, "µs"),
        ));
    }
    if !baseline.top_syscalls.is_empty() || !optimized.top_syscalls.is_empty() {
        rows.push(MetricRow::new(
            "Top syscalls",
            format_syscalls(baseline),
            format_syscalls(optimized),
        ));
    }

    (!rows.is_empty()).then(|| build_table_with_style(&rows, "Telemetry"))
}

pub fn print_configuration(
    machine: &str,
    baseline_script: &str,
    optimized_script: &str,
    config: &BenchmarkConfig,
    tag: Option<&str>,
) {
    info!("Machine:   {machine}");
    info!("Baseline:  {baseline_script}");
    info!("Optimized: {optimized_script}");
    info!("Mode:      {}", config.mode);
    info!("Warmup:    {} runs", config.warmup_runs);
    info!("Measured:  {} runs per scenario", config.runs);
    info!("Alternate: {}", config.alternate);
    info!("Cooldown:  {}", humantime::format_duration(config.cooldown));
    info!("Timeout:   {}", humantime::format_duration(config.timeout));
    if let Some(tag) = tag {
        info!("Tag:       {tag}");
    }
}

pub fn print_results(report: &Report) {
    start_group!("Results");
    info!("\n{}", build_results_table(report));
    info!(
        "{}",
        format_gain(
            &report.comparison,
            &report.baseline.stats,
            &report.optimized.stats
        )
    );
    info!("{}", format_verdict(&report.comparison));

    if let (Some(baseline), Some(optimized)) = (
        &report.baseline.telemetry_summary,
        &report.optimized.telemetry_summary,
    ) {
        if let Some(table) = build_telemetry_table(baseline, optimized) {
            info!("\n{table}");
        }
    }
    end_group!();
}

pub fn build_machines_table(reports: &[Report]) -> String {
    let rows: Vec<MachineRow> = reports
        .iter()
        .map(|report| MachineRow {
            machine: report.machine.clone(),
            gain: format!("{:.2}%", report.comparison.gain_percent),
            baseline: format!("{:.2}", report.baseline.stats.median),
            optimized: format!("{:.2}", report.optimized.stats.median),
            verdict: if report.comparison.conclusive {
                "✓".to_string()
            } else {
                "?".to_string()
            },
            tag: report.tag.clone().unwrap_or_default(),
        })
        .collect();
    build_table_with_style(&rows, "Per-machine results")
}

pub fn print_aggregate(aggregate: &AggregateReport) {
    let stats = &aggregate.aggregate_stats;
    start_group!("Aggregate results");
    info!(
        "Median gain: {}",
        style(format!("{:.2}%", stats.median_gain)).bold()
    );
    info!(
        "P10/P90: {:.2}% / {:.2}%",
        stats.p10_gain, stats.p90_gain
    );
    info!(
        "Mean: {:.2}%, Std Dev: {:.2}%",
        stats.mean_gain, stats.std_dev_gain
    );
    info!("Machines: {}", aggregate.machine_count);
    info!("\n{}", build_machines_table(&aggregate.reports));
    info!("Gains are computed per machine, raw durations are never compared across machines");
    end_group!();
}

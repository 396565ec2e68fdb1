use console::style;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::prelude::*;
use crate::telemetry::{Availability, TelemetryCollector};

#[derive(Tabled)]
struct BackendRow {
    #[tabled(rename = "Signal")]
    signal: String,
    #[tabled(rename = "Backend")]
    backend: String,
    #[tabled(rename = "Command")]
    command: String,
}

pub fn build_backends_table(collector: &TelemetryCollector) -> String {
    let rows: Vec<BackendRow> = collector
        .resolved_backends()
        .into_iter()
        .map(|(signal, resolved)| match resolved {
            Some((backend, command)) => BackendRow {
                signal: signal.to_string(),
                backend: backend.to_string(),
                command: command.to_string(),
            },
            None => BackendRow {
                signal: signal.to_string(),
                backend: "none".to_string(),
                command: "-".to_string(),
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn format_availability(availability: Availability) -> String {
    match availability {
        Availability::Available => format!("Telemetry: {}", style("available").green().bold()),
        Availability::NotPrivileged => format!(
            "Telemetry: {} (not running as root, rerun with sudo)",
            style("unavailable").yellow().bold()
        ),
        Availability::NoBackend => format!(
            "Telemetry: {} (install bcc-tools or bpftrace)",
            style("unavailable").yellow().bold()
        ),
    }
}

pub fn run() -> Result<()> {
    let collector = TelemetryCollector::new();
    info!("\n{}", build_backends_table(&collector));
    info!("{}", format_availability(collector.availability()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{SIGNAL_SAMPLERS, ToolLookup};

    #[test]
    fn test_backends_table_lists_every_signal() {
        let dir = tempfile::tempdir().unwrap();
        let collector = TelemetryCollector::with_samplers(
            SIGNAL_SAMPLERS,
            ToolLookup::new(vec![dir.path().to_path_buf()]),
            false,
        );

        let table = build_backends_table(&collector);

        for signal in ["runqueue latency", "block I/O latency", "off-CPU time", "syscalls"] {
            assert!(table.contains(signal), "missing {signal} in\n{table}");
        }
    }

    #[test]
    fn test_format_availability() {
        let text = console::strip_ansi_codes(&format_availability(Availability::NotPrivileged))
            .to_string();
        assert_eq!(
            text,
            "Telemetry: unavailable (not running as root, rerun with sudo)"
        );
    }
}

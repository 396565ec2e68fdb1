use std::collections::BTreeMap;

use super::metrics::Metrics;

#[derive(Default)]
struct SyscallTotals {
    count: u64,
    latency_us: f64,
    timed: bool,
}

/// Sum the `<name> <count> [<total_us>]` rows of every interval printed by the syscall counter.
///
/// Headers, timestamps and other lines do not have a numeric count and are ignored.
pub fn parse_syscall_table(output: &str) -> Metrics {
    let mut totals: BTreeMap<String, SyscallTotals> = BTreeMap::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (name, count, latency) = match fields.as_slice() {
            [name, count] => (*name, *count, None),
            [name, count, latency] => (*name, *count, Some(*latency)),
            _ => continue,
        };
        let Ok(count) = count.parse::<u64>() else {
            continue;
        };

        let entry = totals.entry(name.to_string()).or_default();
        entry.count += count;
        if let Some(latency_us) = latency.and_then(|l| l.parse::<f64>().ok()) {
            entry.latency_us += latency_us;
            entry.timed = true;
        }
    }

    if totals.is_empty() {
        return Metrics::default();
    }

    let syscall_latency_us: BTreeMap<String, f64> = totals
        .iter()
        .filter(|(_, totals)| totals.timed && totals.count > 0)
        .map(|(name, totals)| (name.clone(), totals.latency_us / totals.count as f64))
        .collect();

    Metrics {
        top_syscalls: Some(
            totals
                .into_iter()
                .map(|(name, totals)| (name, totals.count))
                .collect(),
        ),
        syscall_latency_us: (!syscall_latency_us.is_empty()).then_some(syscall_latency_us),
        ..Default::default()
    }
}

use std::collections::HashMap;

use itertools::Itertools;

use super::metrics::{Metrics, StackTrace};

pub const TOP_STACKS: usize = 5;

/// Reduce folded off-CPU stacks (`frame;frame;... <usecs>`) into total time and heaviest stacks.
pub fn parse_folded_stacks(output: &str) -> Metrics {
    let mut stacks: HashMap<&str, u64> = HashMap::new();
    for line in output.lines().map(str::trim) {
        let Some((stack, usecs)) = line.rsplit_once(char::is_whitespace) else {
            continue;
        };
        let (stack, Ok(usecs)) = (stack.trim(), usecs.parse::<u64>()) else {
            continue;
        };
        if stack.is_empty() {
            continue;
        }
        *stacks.entry(stack).or_default() += usecs;
    }

    let total_us: u64 = stacks.values().sum();
    if total_us == 0 {
        return Metrics::default();
    }

    let top_stacks = stacks
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .take(TOP_STACKS)
        .map(|(stack, usecs)| StackTrace {
            stack: stack.to_string(),
            time_ms: usecs as f64 / 1000.0,
            percent: usecs as f64 / total_us as f64 * 100.0,
        })
        .collect();

    Metrics {
        offcpu_time_ms: Some(total_us as f64 / 1000.0),
        offcpu_top_stacks: Some(top_stacks),
        ..Default::default()
    }
}

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

/// Latency histogram keyed `"<low>-<high>"`, values are sample counts.
pub type Histogram = BTreeMap<String, u64>;

lazy_static! {
    /// `     4 -> 7          : 12       |****      |`
    static ref ARROW_BUCKET_REGEX: Regex =
        Regex::new(r"^\s*(\d+)\s*->\s*(\d+)\s*:\s*(\d+)").unwrap();
    /// `[4, 8)     12 |@@@@     |` or `[0]     3 |@|`, bounds may carry K/M/G suffixes
    static ref BRACKET_BUCKET_REGEX: Regex =
        Regex::new(r"^\s*\[(\d+)([KMG]?)(?:,\s*(\d+)([KMG]?))?[\])]\s+(\d+)").unwrap();
}

fn add_bucket(histogram: &mut Histogram, low: u64, high: u64, count: u64) {
    // Interval tools print one histogram per interval: the same bucket adds up
    *histogram.entry(format!("{low}-{high}")).or_default() += count;
}

/// Parse the `low -> high : count` rows of a probe tool histogram. Other lines are ignored.
pub fn parse_arrow_histogram(output: &str) -> Histogram {
    let mut histogram = Histogram::new();
    for captures in output.lines().filter_map(|line| ARROW_BUCKET_REGEX.captures(line)) {
        let (Ok(low), Ok(high), Ok(count)) = (
            captures[1].parse::<u64>(),
            captures[2].parse::<u64>(),
            captures[3].parse::<u64>(),
        ) else {
            continue;
        };
        add_bucket(&mut histogram, low, high, count);
    }
    histogram
}

fn scale(suffix: &str) -> u64 {
    match suffix {
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        _ => 1,
    }
}

/// Parse the `[low, high) count` rows printed for a tracing-engine `hist()` map.
///
/// Single value buckets (`[n]`) become `n-n`.
pub fn parse_bracket_histogram(output: &str) -> Histogram {
    let mut histogram = Histogram::new();
    for captures in output
        .lines()
        .filter_map(|line| BRACKET_BUCKET_REGEX.captures(line))
    {
        let Ok(low) = captures[1].parse::<u64>() else {
            continue;
        };
        let low = low.saturating_mul(scale(&captures[2]));
        let high = match captures.get(3) {
            Some(high) => {
                let Ok(high) = high.as_str().parse::<u64>() else {
                    continue;
                };
                let suffix = captures.get(4).map_or("", |m| m.as_str());
                high.saturating_mul(scale(suffix))
            }
            None => low,
        };
        let Ok(count) = captures[5].parse::<u64>() else {
            continue;
        };
        add_bucket(&mut histogram, low, high, count);
    }
    histogram
}

fn bucket_bounds(key: &str) -> Option<(f64, f64)> {
    let (low, high) = key.split_once('-')?;
    Some((low.parse().ok()?, high.parse().ok()?))
}

pub fn total_count(histogram: &Histogram) -> u64 {
    histogram.values().sum()
}

/// Count-weighted mean of the bucket midpoints, 0 for an empty histogram.
pub fn weighted_mean(histogram: &Histogram) -> f64 {
    let (weighted_sum, total) = histogram
        .iter()
        .filter_map(|(key, &count)| bucket_bounds(key).map(|bounds| (bounds, count)))
        .fold((0.0, 0u64), |(sum, total), ((low, high), count)| {
            (sum + (low + high) / 2.0 * count as f64, total + count)
        });

    if total == 0 {
        return 0.0;
    }
    weighted_sum / total as f64
}

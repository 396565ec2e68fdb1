const TRUNCATION_MARKER: &str = "...";

/// Keep the last `max_len` bytes of a captured stream, prefixed by a marker when truncated.
///
/// Invalid UTF-8 (including a character cut by the bound) is replaced lossily.
pub fn tail(output: &[u8], max_len: usize) -> String {
    if output.len() <= max_len {
        return String::from_utf8_lossy(output).into_owned();
    }

    let kept = &output[output.len() - max_len..];
    format!("{TRUNCATION_MARKER}{}", String::from_utf8_lossy(kept))
}

/// Extract the throughput a workload reports on its last non-blank line.
///
/// Accepts a bare number or a line containing `THROUGHPUT` (any case) with the value after the
/// last `:`. A trailing unit token is ignored. Anything unparsable yields 0.
pub fn parse_throughput(output: &str) -> f64 {
    let Some(last_line) = output
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
    else {
        return 0.0;
    };

    let value = if last_line.to_uppercase().contains("THROUGHPUT") {
        last_line.rsplit(':').next().unwrap_or(last_line).trim()
    } else {
        last_line
    };

    value
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .unwrap_or(0.0)
}

//! Descriptive statistics and A/B comparison of duration samples.
//!
//! Everything in this crate is a pure function of its input samples, so the same code serves a
//! single-machine benchmark and the cross-machine aggregation of gains.

mod comparison;
mod stats;

pub use comparison::Comparison;
pub use stats::{Stats, percentile, trimmed_mean};

//! corecut: A/B performance measurement of two workloads on one machine

mod prelude;

pub mod benchmark;
pub mod cli;
pub mod executor;
pub mod helpers;
pub mod local_logger;
pub mod logger;
pub mod measurement_mode;
pub mod project_config;
pub mod report;
pub mod system;
pub mod telemetry;

pub use local_logger::clean_logger;
pub use measurement_mode::MeasurementMode;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

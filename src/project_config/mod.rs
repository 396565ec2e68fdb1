use crate::benchmark::BareNumberUnit;
use crate::prelude::*;
use std::fs;
use std::path::Path;

mod interfaces;
pub mod merger;

pub use interfaces::*;

/// Config file names in priority order
const CONFIG_FILENAMES: &[&str] = &["corecut.yaml", "corecut.yml", ".corecut.yaml"];

impl ProjectConfig {
    /// Discover and load project configuration file
    ///
    /// If `config_path_override` is provided, only that path is loaded and a missing file is an
    /// error. Otherwise the file names of `CONFIG_FILENAMES` are tried in order in `current_dir`.
    ///
    /// Returns `Ok(None)` when no config file was found.
    pub fn discover_and_load(
        config_path_override: Option<&Path>,
        current_dir: &Path,
    ) -> Result<Option<ProjectConfig>> {
        if let Some(config_path) = config_path_override {
            let config = Self::load_from_path(config_path)
                .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
            return Ok(Some(config));
        }

        for filename in CONFIG_FILENAMES {
            let candidate_path = current_dir.join(filename);
            if candidate_path.exists() {
                debug!("Found config file at {}", candidate_path.display());
                return Self::load_from_path(&candidate_path).map(Some);
            }
        }

        Ok(None)
    }

    /// Load and parse config from a specific path
    fn load_from_path(path: &Path) -> Result<Self> {
        let config_content = fs::read(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;

        let config: Self = serde_yaml::from_slice(&config_content).with_context(|| {
            format!("Failed to parse corecut project config at {}", path.display())
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Reject values that could never make a valid benchmark
    fn validate(&self) -> Result<()> {
        let Some(options) = &self.options else {
            return Ok(());
        };

        if options.runs == Some(0) {
            bail!("Invalid project configuration: runs must be at least 1");
        }
        if let Some(cooldown) = &options.cooldown {
            cooldown
                .to_duration(BareNumberUnit::Milliseconds)
                .context("Invalid project configuration: cooldown")?;
        }
        if let Some(timeout) = &options.timeout {
            let timeout = timeout
                .to_duration(BareNumberUnit::Seconds)
                .context("Invalid project configuration: timeout")?;
            if timeout.is_zero() {
                bail!("Invalid project configuration: timeout must be greater than zero");
            }
        }

        Ok(())
    }
}

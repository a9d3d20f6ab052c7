//! Monitor configuration management.
//!
//! Handles loading, saving, and validating the engine configuration:
//! - Battery-saver pause between ranging bursts
//! - Regions to register at startup
//!
//! Files are TOML. Values can be overridden from the environment with the
//! `BEACON_` prefix, e.g. `BEACON_BATTERY_SAVER_TIMEOUT_SECS=10`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};
use crate::power::DEFAULT_BATTERY_SAVER_TIMEOUT;
use crate::region::RegionDescriptor;
use crate::types::parse_identifier;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "BEACON";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds to pause ranging after each processed batch.
    #[serde(default = "default_battery_saver_timeout_secs")]
    pub battery_saver_timeout_secs: u64,

    /// Regions to register when the monitor starts.
    #[serde(default)]
    pub regions: Vec<RegionDescriptor>,
}

const fn default_battery_saver_timeout_secs() -> u64 {
    DEFAULT_BATTERY_SAVER_TIMEOUT.as_secs()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            battery_saver_timeout_secs: default_battery_saver_timeout_secs(),
            regions: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from `path`, applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::ConfigNotFound`] if the file does not exist,
    /// [`BeaconError::ConfigParseError`] if it cannot be parsed, and
    /// [`BeaconError::ConfigValidationError`] if the values are invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BeaconError::ConfigNotFound(path.to_path_buf()));
        }

        let config: Self = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            regions = config.regions.len(),
            "config_loaded"
        );
        Ok(config)
    }

    /// Load configuration from `path`, or defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed or validated.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::load_from(path) {
            Err(BeaconError::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Save configuration to `path` as pretty TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized or written.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every value, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::ConfigValidationError`] listing each problem.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.battery_saver_timeout_secs == 0 {
            problems.push("battery_saver_timeout_secs: must be greater than 0".to_string());
        }

        let mut seen = HashSet::new();
        for (index, region) in self.regions.iter().enumerate() {
            match parse_identifier(&region.region_uuid) {
                None => problems.push(format!(
                    "regions[{index}].region_uuid: '{}' is not a valid UUID",
                    region.region_uuid
                )),
                Some(uuid) if !seen.insert(uuid) => problems.push(format!(
                    "regions[{index}].region_uuid: '{}' is listed more than once",
                    region.region_uuid
                )),
                Some(_) => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(BeaconError::ConfigValidationError(problems.join("; ")))
        }
    }

    /// Pause applied after each processed batch.
    #[must_use]
    pub const fn battery_saver_timeout(&self) -> Duration {
        Duration::from_secs(self.battery_saver_timeout_secs)
    }
}

/// Platform configuration file location (`<config dir>/beacon-monitor/config.toml`).
///
/// # Errors
///
/// Returns an error if no home directory can be determined.
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "beacon-monitor").ok_or_else(|| {
        BeaconError::PersistenceError("Cannot determine config directory".into())
    })?;
    Ok(dirs.config_dir().join("config.toml"))
}

//! Persistent storage for region snapshots.
//!
//! Uses a single pretty-printed JSON file of [`RegionDescriptor`] records so a
//! host can restore its monitored regions after a restart.

use std::path::{Path, PathBuf};

use crate::error::{BeaconError, Result};
use crate::region::RegionDescriptor;

const REGIONS_FILE: &str = "regions.json";

/// Storage backend for region snapshots.
#[derive(Debug, Clone)]
pub struct RegionStore {
    data_dir: PathBuf,
}

impl RegionStore {
    /// Create a new store.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory to store data files
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Store rooted at the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn in_default_location() -> Result<Self> {
        Ok(Self::new(default_data_dir()?))
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn regions_path(&self) -> PathBuf {
        self.data_dir.join(REGIONS_FILE)
    }

    /// Load the last saved snapshot; empty if none was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_regions(&self) -> Result<Vec<RegionDescriptor>> {
        let path = self.regions_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| {
            BeaconError::PersistenceError(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Replace the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_regions(&self, regions: &[RegionDescriptor]) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let content = serde_json::to_string_pretty(regions)?;
        write_atomically(&self.regions_path(), &content)?;
        tracing::debug!(regions = regions.len(), "region_snapshot_saved");
        Ok(())
    }
}

fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Platform data directory (`<data dir>/beacon-monitor`).
///
/// # Errors
///
/// Returns an error if no home directory can be determined.
pub fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "beacon-monitor")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| BeaconError::PersistenceError("Cannot determine data directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(uuid: &str, label: &str) -> RegionDescriptor {
        RegionDescriptor {
            region_uuid: uuid.into(),
            region_identifier: label.into(),
            include_unknown: false,
            limit: 0,
        }
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = RegionStore::new(dir.path());
        assert!(store.load_regions().unwrap().is_empty());
    }

    #[test]
    fn test_save_replaces_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = RegionStore::new(dir.path().join("data"));

        store
            .save_regions(&[
                descriptor("E2C56DB5-DFFB-48D2-B060-D0F5A71096E0", "lobby"),
                descriptor("B9407F30-F5F8-466E-AFF9-25556B57FE6D", "dock"),
            ])
            .unwrap();
        store
            .save_regions(&[descriptor("B9407F30-F5F8-466E-AFF9-25556B57FE6D", "dock")])
            .unwrap();

        let loaded = store.load_regions().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].region_identifier, "dock");
        assert!(!dir.path().join("data").join("regions.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_snapshot_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let store = RegionStore::new(dir.path());
        std::fs::write(store.regions_path(), "{not json").unwrap();

        let err = store.load_regions().unwrap_err();
        assert!(matches!(err, BeaconError::PersistenceError(_)));
    }
}

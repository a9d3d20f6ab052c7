//! Monitored regions and the registry that owns them.
//!
//! A [`MonitoredRegion`] is pure data: identifier, label and ranging policy.
//! Subscriber callbacks are kept by the monitor, keyed by identifier, so a
//! region can be snapshotted as a [`RegionDescriptor`] at any time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BeaconError, Result};
use crate::ranging::RangingPolicy;
use crate::types::{canonical_identifier, parse_identifier};

/// Handle for a region as understood by the signal source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeaconRegion {
    /// Broadcast identifier of the region.
    pub uuid: Uuid,
    /// Caller-chosen label.
    pub identifier: String,
}

impl BeaconRegion {
    /// Create a new region handle.
    #[must_use]
    pub fn new(uuid: Uuid, identifier: impl Into<String>) -> Self {
        Self {
            uuid,
            identifier: identifier.into(),
        }
    }
}

/// A region registered for ranging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredRegion {
    region_uuid: Uuid,
    region_identifier: String,
    include_unknown: bool,
    limit: u32,
}

impl MonitoredRegion {
    /// Create a region, validating the identifier text.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidIdentifier`] if `uuid` is not a
    /// hyphenated 128-bit UUID.
    pub fn new(uuid: &str, identifier: &str, limit: u32, include_unknown: bool) -> Result<Self> {
        let region_uuid =
            parse_identifier(uuid).ok_or_else(|| BeaconError::invalid_identifier(uuid, identifier))?;
        Ok(Self {
            region_uuid,
            region_identifier: identifier.to_string(),
            include_unknown,
            limit,
        })
    }

    /// Broadcast identifier of the region.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.region_uuid
    }

    /// Canonical text form of the identifier.
    #[must_use]
    pub fn uuid_string(&self) -> String {
        canonical_identifier(&self.region_uuid)
    }

    /// Caller-chosen label.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.region_identifier
    }

    /// Whether unknown-proximity sightings are reported.
    #[must_use]
    pub const fn include_unknown(&self) -> bool {
        self.include_unknown
    }

    /// Maximum samples per batch, 0 for no bound.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Filtering policy applied to this region's batches.
    #[must_use]
    pub const fn policy(&self) -> RangingPolicy {
        RangingPolicy {
            include_unknown: self.include_unknown,
            limit: self.limit,
        }
    }

    /// Handle passed to the signal source.
    #[must_use]
    pub fn beacon_region(&self) -> BeaconRegion {
        BeaconRegion::new(self.region_uuid, self.region_identifier.clone())
    }

    /// Wire record for this region.
    #[must_use]
    pub fn descriptor(&self) -> RegionDescriptor {
        RegionDescriptor {
            region_uuid: self.uuid_string(),
            region_identifier: self.region_identifier.clone(),
            include_unknown: self.include_unknown,
            limit: self.limit,
        }
    }
}

/// Serializable description of a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    /// Region UUID in text form.
    pub region_uuid: String,
    /// Caller-chosen label.
    pub region_identifier: String,
    /// Whether unknown-proximity sightings are reported.
    #[serde(default)]
    pub include_unknown: bool,
    /// Maximum samples per batch, 0 for no bound.
    #[serde(default)]
    pub limit: u32,
}

impl TryFrom<&RegionDescriptor> for MonitoredRegion {
    type Error = BeaconError;

    fn try_from(descriptor: &RegionDescriptor) -> Result<Self> {
        Self::new(
            &descriptor.region_uuid,
            &descriptor.region_identifier,
            descriptor.limit,
            descriptor.include_unknown,
        )
    }
}

/// The set of monitored regions, unique by identifier.
#[derive(Debug, Default)]
pub struct RegionRegistry {
    regions: Vec<MonitoredRegion>,
}

impl RegionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Add a region.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::DuplicateRegion`] if a region with the same
    /// identifier is already registered; the registry is left unchanged.
    pub fn add(&mut self, region: MonitoredRegion) -> Result<()> {
        if self.contains(region.uuid()) {
            return Err(BeaconError::DuplicateRegion {
                uuid: region.uuid_string(),
                label: region.region_identifier,
            });
        }
        self.regions.push(region);
        Ok(())
    }

    /// Remove every region with the given identifier and return them.
    pub fn remove(&mut self, uuid: Uuid) -> Vec<MonitoredRegion> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.regions)
            .into_iter()
            .partition(|region| region.region_uuid == uuid);
        self.regions = kept;
        removed
    }

    /// Look up a region by identifier.
    #[must_use]
    pub fn find(&self, uuid: Uuid) -> Option<&MonitoredRegion> {
        self.regions.iter().find(|region| region.region_uuid == uuid)
    }

    /// Whether a region with this identifier is registered.
    #[must_use]
    pub fn contains(&self, uuid: Uuid) -> bool {
        self.find(uuid).is_some()
    }

    /// Number of registered regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no region is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Regions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MonitoredRegion> {
        self.regions.iter()
    }

    /// Snapshot of every region in insertion order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<RegionDescriptor> {
        self.regions.iter().map(MonitoredRegion::descriptor).collect()
    }
}

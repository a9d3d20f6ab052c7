//! # beacon-core
//!
//! Core engine for the beacon-monitor proximity ranging system.
//!
//! This crate provides:
//! - Region registration with identifier validation and uniqueness
//! - Per-batch ranking, filtering and limiting of beacon sightings
//! - Battery-saving pause/resume scheduling of active ranging
//! - Configuration and region snapshot persistence
//!
//! ## Architecture
//!
//! The crate is sans-IO: the platform is reached through the
//! [`SignalSource`] and [`PermissionService`] traits, and timers are
//! reported as [`ArmedTimer`] values for the host to run.
//!
//! - [`monitor`] - The [`BeaconMonitor`] orchestrator
//! - [`region`] - Monitored regions and the region registry
//! - [`ranging`] - Pure ranking/filtering of one sighting batch
//! - [`power`] - Battery-saver ranging state machine
//! - [`signal`] - Platform boundary traits and test doubles
//! - [`types`] - Identities, proximity levels, samples and wire records
//! - [`config`] - Configuration loading, saving and validation
//! - [`storage`] - Region snapshot persistence
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod monitor;
pub mod power;
pub mod ranging;
pub mod region;
pub mod signal;
pub mod storage;
pub mod types;

// Re-export primary types for convenience
pub use config::{default_config_path, MonitorConfig};
pub use error::{BeaconError, Result};
pub use monitor::{BeaconMonitor, RangedCallback};
pub use power::{
    ArmedTimer, PowerScheduler, RegionPowerState, TimerToken, DEFAULT_BATTERY_SAVER_TIMEOUT,
};
pub use ranging::RangingPolicy;
pub use region::{BeaconRegion, MonitoredRegion, RegionDescriptor, RegionRegistry};
#[cfg(any(test, feature = "mock-signal"))]
pub use signal::{RecordingPermissions, RecordingSignalSource, SignalCommand};
pub use signal::{PermissionService, RegionState, SignalSource};
pub use storage::{default_data_dir, RegionStore};
pub use types::{
    canonical_identifier, parse_identifier, BeaconIdentity, ProximityEvent, ProximityLevel,
    ProximitySample, RawSighting,
};

//! Boundary with the platform: the signal source and the permission service.
//!
//! The engine never talks to hardware directly. It drives a [`SignalSource`]
//! with fire-and-forget start/stop calls and is fed back through
//! [`BeaconMonitor`](crate::monitor::BeaconMonitor)'s event methods.

use serde::{Deserialize, Serialize};

use crate::region::BeaconRegion;

/// Radio/positioning subsystem that physically ranges beacons.
pub trait SignalSource {
    /// Begin delivering sighting batches for `region`.
    fn start_ranging(&mut self, region: &BeaconRegion);

    /// Stop delivering sighting batches for `region`.
    fn stop_ranging(&mut self, region: &BeaconRegion);
}

/// Platform permission prompt.
pub trait PermissionService {
    /// Ask for permission to range in the background.
    fn request_always_authorization(&mut self);
}

/// Whether the device is inside or outside a region, as determined by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionState {
    /// The device entered (or is in) the region.
    Inside,
    /// The device left (or is not in) the region.
    Outside,
}

#[cfg(any(test, feature = "mock-signal"))]
pub use mock::{RecordingPermissions, RecordingSignalSource, SignalCommand};

#[cfg(any(test, feature = "mock-signal"))]
mod mock {
    use std::sync::{Arc, Mutex, PoisonError};

    use uuid::Uuid;

    use super::{BeaconRegion, PermissionService, SignalSource};

    /// A call made on a [`RecordingSignalSource`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SignalCommand {
        /// `start_ranging` was called for this region.
        Start(Uuid),
        /// `stop_ranging` was called for this region.
        Stop(Uuid),
    }

    /// Signal source that records every call, for tests and simulations.
    ///
    /// Clones share the same log, so a clone kept by the test observes the
    /// calls made on the instance moved into the monitor.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSignalSource {
        log: Arc<Mutex<Vec<SignalCommand>>>,
    }

    impl RecordingSignalSource {
        /// Create an empty recorder.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Every call so far, oldest first.
        #[must_use]
        pub fn commands(&self) -> Vec<SignalCommand> {
            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Drain the log.
        pub fn take(&self) -> Vec<SignalCommand> {
            std::mem::take(&mut *self.log.lock().unwrap_or_else(PoisonError::into_inner))
        }

        /// Whether the last call for `uuid` was a start.
        #[must_use]
        pub fn is_ranging(&self, uuid: Uuid) -> bool {
            self.commands()
                .iter()
                .rev()
                .find_map(|command| match command {
                    SignalCommand::Start(id) if *id == uuid => Some(true),
                    SignalCommand::Stop(id) if *id == uuid => Some(false),
                    _ => None,
                })
                .unwrap_or(false)
        }

        fn push(&self, command: SignalCommand) {
            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(command);
        }
    }

    impl SignalSource for RecordingSignalSource {
        fn start_ranging(&mut self, region: &BeaconRegion) {
            self.push(SignalCommand::Start(region.uuid));
        }

        fn stop_ranging(&mut self, region: &BeaconRegion) {
            self.push(SignalCommand::Stop(region.uuid));
        }
    }

    /// Permission service that counts authorization requests.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingPermissions {
        requests: Arc<Mutex<usize>>,
    }

    impl RecordingPermissions {
        /// Create a fresh counter.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of authorization requests made so far.
        #[must_use]
        pub fn requests(&self) -> usize {
            *self.requests.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl PermissionService for RecordingPermissions {
        fn request_always_authorization(&mut self) {
            *self.requests.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        }
    }
}

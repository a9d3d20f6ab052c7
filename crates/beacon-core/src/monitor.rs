//! The monitoring engine.
//!
//! [`BeaconMonitor`] owns the region registry, the subscriber callbacks and
//! the power scheduler. It is driven from one serial context: caller
//! operations, signal-source events and timer firings must not run
//! concurrently. Nothing here blocks; hardware interaction goes through
//! the [`SignalSource`] as fire-and-forget calls.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::power::{ArmedTimer, PowerScheduler, RegionPowerState, TimerToken};
use crate::ranging;
use crate::region::{BeaconRegion, MonitoredRegion, RegionDescriptor, RegionRegistry};
use crate::signal::{PermissionService, RegionState, SignalSource};
use crate::types::{parse_identifier, ProximitySample, RawSighting};

/// Subscriber invoked once per emitted sample, in best-first order.
pub type RangedCallback = Box<dyn FnMut(ProximitySample) + Send>;

/// Proximity-beacon monitoring engine.
pub struct BeaconMonitor<S, P> {
    registry: RegionRegistry,
    subscribers: HashMap<Uuid, RangedCallback>,
    power: PowerScheduler,
    source: S,
    permissions: P,
}

impl<S, P> fmt::Debug for BeaconMonitor<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeaconMonitor")
            .field("registry", &self.registry)
            .field("subscribers", &self.subscribers.len())
            .field("power", &self.power)
            .finish_non_exhaustive()
    }
}

impl<S: SignalSource, P: PermissionService> BeaconMonitor<S, P> {
    /// Create a monitor with the default battery-saver timeout.
    pub fn new(source: S, permissions: P) -> Self {
        Self::with_scheduler(source, permissions, PowerScheduler::default())
    }

    /// Create a monitor with a custom power scheduler.
    pub fn with_scheduler(source: S, permissions: P, power: PowerScheduler) -> Self {
        Self {
            registry: RegionRegistry::new(),
            subscribers: HashMap::new(),
            power,
            source,
            permissions,
        }
    }

    /// Create a monitor from configuration and register its regions.
    ///
    /// `subscriber_for` supplies the callback for each configured region.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid; no region is
    /// registered in that case.
    pub fn from_config<F>(
        config: &MonitorConfig,
        source: S,
        permissions: P,
        mut subscriber_for: F,
    ) -> Result<Self>
    where
        F: FnMut(&RegionDescriptor) -> RangedCallback,
    {
        config.validate()?;
        let mut monitor = Self::with_scheduler(
            source,
            permissions,
            PowerScheduler::new(config.battery_saver_timeout()),
        );
        for descriptor in &config.regions {
            let region = MonitoredRegion::try_from(descriptor)?;
            monitor.insert(region, subscriber_for(descriptor))?;
        }
        Ok(monitor)
    }

    /// Register a region and start ranging it.
    ///
    /// # Errors
    ///
    /// - [`BeaconError::InvalidIdentifier`](crate::BeaconError::InvalidIdentifier)
    ///   if `uuid` is malformed
    /// - [`BeaconError::DuplicateRegion`](crate::BeaconError::DuplicateRegion)
    ///   if the identifier is already monitored
    ///
    /// On error nothing is registered and ranging is not touched.
    pub fn register_region<F>(
        &mut self,
        uuid: &str,
        label: &str,
        limit: u32,
        include_unknown: bool,
        on_ranged: F,
    ) -> Result<()>
    where
        F: FnMut(ProximitySample) + Send + 'static,
    {
        let region = MonitoredRegion::new(uuid, label, limit, include_unknown)?;
        self.insert(region, Box::new(on_ranged))
    }

    /// Register a region from its wire record.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register_region`].
    pub fn register_descriptor<F>(&mut self, descriptor: &RegionDescriptor, on_ranged: F) -> Result<()>
    where
        F: FnMut(ProximitySample) + Send + 'static,
    {
        let region = MonitoredRegion::try_from(descriptor)?;
        self.insert(region, Box::new(on_ranged))
    }

    /// Stop monitoring a region. Unknown or malformed identifiers are a no-op.
    pub fn unregister_region(&mut self, uuid: &str) {
        let Some(uuid) = parse_identifier(uuid) else {
            debug!(uuid, "unregister_malformed_identifier_ignored");
            return;
        };
        let removed = self.registry.remove(uuid);
        if removed.is_empty() {
            debug!(region = %uuid, "unregister_unknown_region_ignored");
            return;
        }
        self.subscribers.remove(&uuid);
        self.power.forget(uuid, &mut self.source);
        info!(region = %uuid, removed = removed.len(), "region_unregistered");
    }

    /// Request background permission, then range every registered region.
    pub fn start_monitoring_all(&mut self) {
        self.permissions.request_always_authorization();
        self.power.start_all(&mut self.source);
        info!(regions = self.registry.len(), "monitoring_started");
    }

    /// Stop ranging everywhere and cancel the battery-saver timer.
    ///
    /// Regions stay registered; [`Self::start_monitoring_all`] resumes them.
    pub fn stop_scanning(&mut self) {
        self.power.stop_all(&mut self.source);
    }

    /// Handle a batch of sightings from the signal source.
    ///
    /// Batches for unregistered or stopped regions are dropped silently; the
    /// source may still deliver in-flight batches after either happened.
    pub fn on_sighting_batch(&mut self, region: &BeaconRegion, sightings: &[RawSighting]) {
        if sightings.is_empty() {
            return;
        }
        let Some(monitored) = self.registry.find(region.uuid) else {
            debug!(region = %region.uuid, "batch_for_unregistered_region_dropped");
            return;
        };
        if self.power.state(region.uuid) == Some(RegionPowerState::Stopped) {
            debug!(region = %region.uuid, "batch_for_stopped_region_dropped");
            return;
        }

        let samples = ranging::process(sightings, monitored.policy(), Utc::now());
        debug!(
            region = %region.uuid,
            sightings = sightings.len(),
            emitted = samples.len(),
            "batch_ranged"
        );
        if let Some(on_ranged) = self.subscribers.get_mut(&region.uuid) {
            for sample in samples {
                trace!(beacon = %sample.identity, "{}", sample.description());
                on_ranged(sample);
            }
        }

        self.power.on_batch_processed(region.uuid, &mut self.source);
    }

    /// Handle an inside/outside determination from the platform.
    pub fn on_region_state_changed(&mut self, region: &BeaconRegion, state: RegionState) {
        self.power.on_region_state(region, state, &mut self.source);
    }

    /// Handle the battery-saver timer firing. Stale tokens are ignored.
    pub fn on_timer_fired(&mut self, token: TimerToken) {
        self.power.on_timer_fired(token, &mut self.source);
    }

    /// The battery-saver timer the host should be running, if any.
    #[must_use]
    pub const fn armed_timer(&self) -> Option<ArmedTimer> {
        self.power.armed_timer()
    }

    /// Ranging state of a registered region.
    #[must_use]
    pub fn region_state(&self, uuid: &str) -> Option<RegionPowerState> {
        parse_identifier(uuid).and_then(|uuid| self.power.state(uuid))
    }

    /// Whether a region with this identifier is registered.
    #[must_use]
    pub fn is_monitoring(&self, uuid: &str) -> bool {
        parse_identifier(uuid).is_some_and(|uuid| self.registry.contains(uuid))
    }

    /// Number of registered regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.registry.len()
    }

    /// Snapshot of every registered region, in registration order.
    #[must_use]
    pub fn region_descriptors(&self) -> Vec<RegionDescriptor> {
        self.registry.descriptors()
    }

    fn insert(&mut self, region: MonitoredRegion, on_ranged: RangedCallback) -> Result<()> {
        let beacon_region = region.beacon_region();
        let policy = region.policy();
        self.registry.add(region)?;
        self.subscribers.insert(beacon_region.uuid, on_ranged);
        self.power.start(&beacon_region, &mut self.source);
        info!(
            region = %beacon_region.uuid,
            identifier = %beacon_region.identifier,
            limit = policy.limit,
            include_unknown = policy.include_unknown,
            "region_registered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::error::BeaconError;
    use crate::signal::{RecordingPermissions, RecordingSignalSource, SignalCommand};
    use crate::types::{BeaconIdentity, ProximityLevel};

    const LOBBY: &str = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0";
    const DOCK: &str = "B9407F30-F5F8-466E-AFF9-25556B57FE6D";

    type Received = Arc<Mutex<Vec<ProximitySample>>>;
    type TestMonitor = BeaconMonitor<RecordingSignalSource, RecordingPermissions>;

    struct Harness {
        monitor: TestMonitor,
        source: RecordingSignalSource,
        permissions: RecordingPermissions,
    }

    fn harness() -> Harness {
        let source = RecordingSignalSource::new();
        let permissions = RecordingPermissions::new();
        let monitor = BeaconMonitor::with_scheduler(
            source.clone(),
            permissions.clone(),
            PowerScheduler::new(Duration::from_secs(10)),
        );
        Harness {
            monitor,
            source,
            permissions,
        }
    }

    fn collector() -> (Received, impl FnMut(ProximitySample) + Send + 'static) {
        let received: Received = Arc::default();
        let sink = Arc::clone(&received);
        (received, move |sample| sink.lock().unwrap().push(sample))
    }

    fn beacon_region(uuid: &str) -> BeaconRegion {
        BeaconRegion::new(parse_identifier(uuid).unwrap(), "test")
    }

    fn sighting(uuid: &str, minor: u16, proximity: ProximityLevel, rssi: i16) -> RawSighting {
        RawSighting::new(
            BeaconIdentity::new(parse_identifier(uuid).unwrap(), 100, minor),
            proximity,
            rssi,
        )
    }

    #[test]
    fn test_register_starts_ranging() {
        let mut h = harness();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, |_| {})
            .unwrap();

        assert!(h.monitor.is_monitoring(LOBBY));
        assert_eq!(h.monitor.region_state(LOBBY), Some(RegionPowerState::Ranging));
        assert_eq!(
            h.source.commands(),
            vec![SignalCommand::Start(parse_identifier(LOBBY).unwrap())]
        );
    }

    #[test]
    fn test_invalid_identifier_leaves_registry_untouched() {
        let mut h = harness();
        let err = h
            .monitor
            .register_region("lobby-uuid", "lobby", 0, false, |_| {})
            .unwrap_err();

        assert!(matches!(err, BeaconError::InvalidIdentifier { .. }));
        assert_eq!(h.monitor.region_count(), 0);
        assert!(h.source.commands().is_empty());
    }

    #[test]
    fn test_duplicate_region_rejected_and_first_kept() {
        let mut h = harness();
        let (first, on_first) = collector();
        let (second, on_second) = collector();
        h.monitor
            .register_region(LOBBY, "first", 0, false, on_first)
            .unwrap();
        h.source.take();

        let err = h
            .monitor
            .register_region(LOBBY, "second", 1, true, on_second)
            .unwrap_err();
        assert!(matches!(err, BeaconError::DuplicateRegion { .. }));
        assert_eq!(h.monitor.region_count(), 1);
        assert_eq!(h.monitor.region_descriptors()[0].region_identifier, "first");
        assert!(h.source.commands().is_empty());

        h.monitor.on_sighting_batch(
            &beacon_region(LOBBY),
            &[sighting(LOBBY, 1, ProximityLevel::Near, -60)],
        );
        assert_eq!(first.lock().unwrap().len(), 1);
        assert!(second.lock().unwrap().is_empty());
    }

    #[test]
    fn test_batch_emits_ranked_samples_and_pauses() {
        let mut h = harness();
        let (received, on_ranged) = collector();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, on_ranged)
            .unwrap();

        h.monitor.on_sighting_batch(
            &beacon_region(LOBBY),
            &[
                sighting(LOBBY, 1, ProximityLevel::Far, -80),
                sighting(LOBBY, 2, ProximityLevel::Immediate, -40),
                sighting(LOBBY, 3, ProximityLevel::Near, -60),
            ],
        );

        let levels: Vec<_> = received.lock().unwrap().iter().map(|s| s.proximity).collect();
        assert_eq!(
            levels,
            vec![
                ProximityLevel::Immediate,
                ProximityLevel::Near,
                ProximityLevel::Far
            ]
        );
        assert_eq!(
            h.monitor.region_state(LOBBY),
            Some(RegionPowerState::PausedForBattery)
        );
        assert_eq!(
            h.monitor.armed_timer().map(|t| t.after),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_limit_applies_per_batch() {
        let mut h = harness();
        let (received, on_ranged) = collector();
        h.monitor
            .register_region(LOBBY, "lobby", 2, false, on_ranged)
            .unwrap();

        let batch: Vec<_> = (1..=5)
            .map(|minor| sighting(LOBBY, minor, ProximityLevel::Near, -50 - i16::try_from(minor).unwrap()))
            .collect();
        h.monitor.on_sighting_batch(&beacon_region(LOBBY), &batch);

        let minors: Vec<_> = received.lock().unwrap().iter().map(|s| s.identity.minor).collect();
        assert_eq!(minors, vec![1, 2]);
    }

    #[test]
    fn test_unknown_only_batch_respects_policy() {
        let mut h = harness();
        let (strict, on_strict) = collector();
        let (lenient, on_lenient) = collector();
        h.monitor
            .register_region(LOBBY, "strict", 0, false, on_strict)
            .unwrap();
        h.monitor
            .register_region(DOCK, "lenient", 0, true, on_lenient)
            .unwrap();

        h.monitor.on_sighting_batch(
            &beacon_region(LOBBY),
            &[
                sighting(LOBBY, 1, ProximityLevel::Unknown, -90),
                sighting(LOBBY, 2, ProximityLevel::Unknown, -91),
            ],
        );
        h.monitor.on_sighting_batch(
            &beacon_region(DOCK),
            &[
                sighting(DOCK, 1, ProximityLevel::Unknown, -90),
                sighting(DOCK, 2, ProximityLevel::Unknown, -91),
            ],
        );

        assert!(strict.lock().unwrap().is_empty());
        assert_eq!(lenient.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut h = harness();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, |_| {})
            .unwrap();
        h.monitor.on_sighting_batch(&beacon_region(LOBBY), &[]);

        assert_eq!(h.monitor.region_state(LOBBY), Some(RegionPowerState::Ranging));
        assert!(h.monitor.armed_timer().is_none());
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut h = harness();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, |_| {})
            .unwrap();
        h.source.take();

        h.monitor.unregister_region(DOCK);
        h.monitor.unregister_region("not a uuid");

        assert_eq!(h.monitor.region_count(), 1);
        assert!(h.source.commands().is_empty());
    }

    #[test]
    fn test_batch_after_unregister_is_dropped() {
        let mut h = harness();
        let (received, on_ranged) = collector();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, on_ranged)
            .unwrap();
        h.monitor.unregister_region(&LOBBY.to_lowercase());
        assert!(!h.source.is_ranging(parse_identifier(LOBBY).unwrap()));

        h.monitor.on_sighting_batch(
            &beacon_region(LOBBY),
            &[sighting(LOBBY, 1, ProximityLevel::Near, -60)],
        );
        assert!(received.lock().unwrap().is_empty());
        assert!(h.monitor.armed_timer().is_none());
    }

    #[test]
    fn test_timer_resumes_ranging() {
        let mut h = harness();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, |_| {})
            .unwrap();
        h.monitor.on_sighting_batch(
            &beacon_region(LOBBY),
            &[sighting(LOBBY, 1, ProximityLevel::Near, -60)],
        );

        let token = h.monitor.armed_timer().unwrap().token;
        h.monitor.on_timer_fired(token);

        assert_eq!(h.monitor.region_state(LOBBY), Some(RegionPowerState::Ranging));
        assert!(h.source.is_ranging(parse_identifier(LOBBY).unwrap()));
    }

    #[test]
    fn test_stop_scanning_cancels_pending_timer() {
        let mut h = harness();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, |_| {})
            .unwrap();
        h.monitor.on_sighting_batch(
            &beacon_region(LOBBY),
            &[sighting(LOBBY, 1, ProximityLevel::Near, -60)],
        );
        let token = h.monitor.armed_timer().unwrap().token;

        h.monitor.stop_scanning();
        h.monitor.on_timer_fired(token);

        assert_eq!(h.monitor.region_state(LOBBY), Some(RegionPowerState::Stopped));
        assert!(!h.source.is_ranging(parse_identifier(LOBBY).unwrap()));
        assert!(h.monitor.armed_timer().is_none());
    }

    #[test]
    fn test_batch_while_stopped_is_dropped() {
        let mut h = harness();
        let (received, on_ranged) = collector();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, on_ranged)
            .unwrap();
        h.monitor.stop_scanning();

        h.monitor.on_sighting_batch(
            &beacon_region(LOBBY),
            &[sighting(LOBBY, 1, ProximityLevel::Near, -60)],
        );
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_late_entry_after_stop_does_not_restart_ranging() {
        let mut h = harness();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, |_| {})
            .unwrap();
        h.monitor.stop_scanning();

        h.monitor
            .on_region_state_changed(&beacon_region(LOBBY), RegionState::Inside);

        assert_eq!(h.monitor.region_state(LOBBY), Some(RegionPowerState::Stopped));
        assert!(!h.source.is_ranging(parse_identifier(LOBBY).unwrap()));
    }

    #[test]
    fn test_repeated_unknown_sightings_each_delivered() {
        let mut h = harness();
        let (received, on_ranged) = collector();
        h.monitor
            .register_region(LOBBY, "lobby", 0, true, on_ranged)
            .unwrap();

        h.monitor.on_sighting_batch(
            &beacon_region(LOBBY),
            &[
                sighting(LOBBY, 3, ProximityLevel::Unknown, -90),
                sighting(LOBBY, 3, ProximityLevel::Unknown, -90),
            ],
        );
        assert_eq!(received.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_start_monitoring_all_requests_permission() {
        let mut h = harness();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, |_| {})
            .unwrap();
        h.monitor
            .register_region(DOCK, "dock", 0, false, |_| {})
            .unwrap();
        h.monitor.stop_scanning();

        h.monitor.start_monitoring_all();

        assert_eq!(h.permissions.requests(), 1);
        assert_eq!(h.monitor.region_state(LOBBY), Some(RegionPowerState::Ranging));
        assert_eq!(h.monitor.region_state(DOCK), Some(RegionPowerState::Ranging));
    }

    #[test]
    fn test_region_state_changes_bypass_timer() {
        let mut h = harness();
        h.monitor
            .register_region(LOBBY, "lobby", 0, false, |_| {})
            .unwrap();
        let region = beacon_region(LOBBY);

        h.monitor.on_region_state_changed(&region, RegionState::Outside);
        assert_eq!(h.monitor.region_state(LOBBY), Some(RegionPowerState::Outside));

        h.monitor.on_region_state_changed(&region, RegionState::Inside);
        assert_eq!(h.monitor.region_state(LOBBY), Some(RegionPowerState::Ranging));
    }

    #[test]
    fn test_from_config_registers_regions() {
        let source = RecordingSignalSource::new();
        let config = MonitorConfig {
            battery_saver_timeout_secs: 7,
            regions: vec![
                RegionDescriptor {
                    region_uuid: LOBBY.into(),
                    region_identifier: "lobby".into(),
                    include_unknown: false,
                    limit: 0,
                },
                RegionDescriptor {
                    region_uuid: DOCK.into(),
                    region_identifier: "dock".into(),
                    include_unknown: true,
                    limit: 1,
                },
            ],
        };
        let mut labels = Vec::new();
        let mut monitor = BeaconMonitor::from_config(
            &config,
            source.clone(),
            RecordingPermissions::new(),
            |descriptor| {
                labels.push(descriptor.region_identifier.clone());
                Box::new(|_: ProximitySample| {})
            },
        )
        .unwrap();

        assert_eq!(labels, vec!["lobby", "dock"]);
        assert_eq!(monitor.region_count(), 2);
        assert!(source.is_ranging(parse_identifier(DOCK).unwrap()));

        monitor.on_sighting_batch(
            &beacon_region(DOCK),
            &[sighting(DOCK, 1, ProximityLevel::Far, -80)],
        );
        assert_eq!(
            monitor.armed_timer().map(|t| t.after),
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let config = MonitorConfig {
            battery_saver_timeout_secs: 0,
            regions: Vec::new(),
        };
        let err = BeaconMonitor::from_config(
            &config,
            RecordingSignalSource::new(),
            RecordingPermissions::new(),
            |_| Box::new(|_: ProximitySample| {}),
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_register_from_descriptor() {
        let mut h = harness();
        let descriptor = RegionDescriptor {
            region_uuid: LOBBY.to_lowercase(),
            region_identifier: "lobby".into(),
            include_unknown: true,
            limit: 4,
        };
        h.monitor.register_descriptor(&descriptor, |_| {}).unwrap();

        let snapshot = h.monitor.region_descriptors();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].region_uuid, LOBBY);
        assert_eq!(snapshot[0].limit, 4);
        assert!(snapshot[0].include_unknown);
    }
}

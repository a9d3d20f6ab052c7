//! Battery-saving scan scheduling.
//!
//! Ranging is expensive, so each region ranges only until one batch has been
//! processed. It is then paused and a single shared one-shot timer is armed;
//! when that timer fires every paused region resumes. One timer serves all
//! regions, and re-arming it restarts the countdown. A batch from one region
//! therefore pushes back the resume of every other paused region as well.
//!
//! The scheduler never sleeps itself. The host reads [`PowerScheduler::armed_timer`]
//! after each event and calls [`PowerScheduler::on_timer_fired`] with the
//! token when the deadline passes. Tokens of timers that were re-armed or
//! cancelled in the meantime are ignored.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::region::BeaconRegion;
use crate::signal::{RegionState, SignalSource};

/// Default pause between two ranging bursts.
pub const DEFAULT_BATTERY_SAVER_TIMEOUT: Duration = Duration::from_secs(30);

/// Ranging state of one tracked region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionPowerState {
    /// Sightings are being delivered.
    Ranging,
    /// Paused after a batch; resumes when the battery-saver timer fires.
    PausedForBattery,
    /// The device left the region; resumes only on re-entry.
    Outside,
    /// Scanning was stopped for the session.
    Stopped,
}

impl fmt::Display for RegionPowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ranging => "ranging",
            Self::PausedForBattery => "paused_for_battery",
            Self::Outside => "outside",
            Self::Stopped => "stopped",
        })
    }
}

/// Identifies one arming of the battery-saver timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

/// The currently armed battery-saver timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    /// Token to hand back when the timer fires.
    pub token: TimerToken,
    /// Delay from the moment of arming.
    pub after: Duration,
}

#[derive(Debug)]
struct TrackedRegion {
    region: BeaconRegion,
    state: RegionPowerState,
}

/// Timer-driven ranging state machine for all monitored regions.
#[derive(Debug)]
pub struct PowerScheduler {
    battery_saver_timeout: Duration,
    regions: Vec<TrackedRegion>,
    armed: Option<ArmedTimer>,
    last_token: u64,
}

impl Default for PowerScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_BATTERY_SAVER_TIMEOUT)
    }
}

impl PowerScheduler {
    /// Create a scheduler pausing for `battery_saver_timeout` after each batch.
    #[must_use]
    pub const fn new(battery_saver_timeout: Duration) -> Self {
        Self {
            battery_saver_timeout,
            regions: Vec::new(),
            armed: None,
            last_token: 0,
        }
    }

    /// Pause applied after each processed batch.
    #[must_use]
    pub const fn battery_saver_timeout(&self) -> Duration {
        self.battery_saver_timeout
    }

    /// The timer the host should currently be running, if any.
    #[must_use]
    pub const fn armed_timer(&self) -> Option<ArmedTimer> {
        self.armed
    }

    /// Current state of a tracked region.
    #[must_use]
    pub fn state(&self, uuid: Uuid) -> Option<RegionPowerState> {
        self.tracked(uuid).map(|tracked| tracked.state)
    }

    /// Whether any tracked region is still part of an active session.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.regions
            .iter()
            .any(|tracked| tracked.state != RegionPowerState::Stopped)
    }

    /// Start ranging `region`, tracking it if it is new.
    pub fn start<S: SignalSource>(&mut self, region: &BeaconRegion, source: &mut S) {
        match self.regions.iter().position(|t| t.region.uuid == region.uuid) {
            Some(index) => self.regions[index].region = region.clone(),
            None => self.regions.push(TrackedRegion {
                region: region.clone(),
                state: RegionPowerState::Stopped,
            }),
        }
        self.enter_ranging(region.uuid, source);
    }

    /// Start ranging every tracked region.
    pub fn start_all<S: SignalSource>(&mut self, source: &mut S) {
        let uuids: Vec<Uuid> = self.regions.iter().map(|t| t.region.uuid).collect();
        for uuid in uuids {
            self.enter_ranging(uuid, source);
        }
    }

    /// Stop ranging `uuid` and stop tracking it.
    pub fn forget<S: SignalSource>(&mut self, uuid: Uuid, source: &mut S) {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.regions)
            .into_iter()
            .partition(|tracked| tracked.region.uuid == uuid);
        self.regions = kept;
        for tracked in removed {
            source.stop_ranging(&tracked.region);
            debug!(region = %tracked.region.uuid, "region_forgotten");
        }
    }

    /// A batch for `uuid` was processed: pause it and arm the timer.
    ///
    /// Only a ranging region is paused; late batches for regions in any
    /// other state leave the schedule untouched.
    pub fn on_batch_processed<S: SignalSource>(&mut self, uuid: Uuid, source: &mut S) {
        let timeout = self.battery_saver_timeout;
        let Some(tracked) = self.tracked_mut(uuid) else {
            return;
        };
        if tracked.state != RegionPowerState::Ranging {
            return;
        }
        source.stop_ranging(&tracked.region);
        tracked.state = RegionPowerState::PausedForBattery;

        let timer = self.arm();
        debug!(
            region = %uuid,
            token = timer.token.0,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "ranging_paused_for_battery"
        );
    }

    /// The battery-saver timer fired. Returns `false` for stale tokens.
    pub fn on_timer_fired<S: SignalSource>(&mut self, token: TimerToken, source: &mut S) -> bool {
        if self.armed.map(|timer| timer.token) != Some(token) {
            debug!(token = token.0, "stale_battery_saver_timer_ignored");
            return false;
        }
        self.armed = None;

        let mut resumed = 0_usize;
        for tracked in &mut self.regions {
            if tracked.state == RegionPowerState::PausedForBattery {
                source.start_ranging(&tracked.region);
                tracked.state = RegionPowerState::Ranging;
                resumed += 1;
            }
        }
        debug!(token = token.0, resumed, "battery_saver_timer_fired");
        true
    }

    /// The platform reported entering or leaving `region`.
    ///
    /// Ignored for untracked regions and for regions stopped with
    /// [`PowerScheduler::stop_all`].
    pub fn on_region_state<S: SignalSource>(
        &mut self,
        region: &BeaconRegion,
        state: RegionState,
        source: &mut S,
    ) {
        match self.state(region.uuid) {
            None => {
                debug!(region = %region.uuid, ?state, "region_state_for_untracked_region");
                return;
            }
            Some(RegionPowerState::Stopped) => {
                debug!(region = %region.uuid, ?state, "region_state_for_stopped_region_ignored");
                return;
            }
            Some(_) => {}
        }
        match state {
            RegionState::Inside => self.enter_ranging(region.uuid, source),
            RegionState::Outside => {
                if let Some(tracked) = self.tracked_mut(region.uuid) {
                    source.stop_ranging(&tracked.region);
                    tracked.state = RegionPowerState::Outside;
                    info!(region = %region.uuid, "region_exited");
                }
            }
        }
    }

    /// Cancel the timer and stop ranging everywhere.
    pub fn stop_all<S: SignalSource>(&mut self, source: &mut S) {
        self.armed = None;
        for tracked in &mut self.regions {
            source.stop_ranging(&tracked.region);
            tracked.state = RegionPowerState::Stopped;
        }
        info!(regions = self.regions.len(), "scanning_stopped");
    }

    fn enter_ranging<S: SignalSource>(&mut self, uuid: Uuid, source: &mut S) {
        if let Some(tracked) = self.tracked_mut(uuid) {
            source.start_ranging(&tracked.region);
            let previous = std::mem::replace(&mut tracked.state, RegionPowerState::Ranging);
            debug!(region = %uuid, %previous, "ranging_started");
        }
    }

    fn arm(&mut self) -> ArmedTimer {
        self.last_token += 1;
        let timer = ArmedTimer {
            token: TimerToken(self.last_token),
            after: self.battery_saver_timeout,
        };
        self.armed = Some(timer);
        timer
    }

    fn tracked(&self, uuid: Uuid) -> Option<&TrackedRegion> {
        self.regions.iter().find(|t| t.region.uuid == uuid)
    }

    fn tracked_mut(&mut self, uuid: Uuid) -> Option<&mut TrackedRegion> {
        self.regions.iter_mut().find(|t| t.region.uuid == uuid)
    }
}

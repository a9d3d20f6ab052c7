//! Beacon value types and wire records.
//!
//! Everything here is an immutable value: identities, proximity levels, raw
//! sightings as reported by the signal source, and the samples handed to
//! subscribers. [`ProximityEvent`] is the record format used when a sample
//! leaves the engine (storage, a UI bridge, a remote store).

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BeaconError, Result};

/// Length of a hyphenated UUID string, the only accepted text form.
const HYPHENATED_UUID_LEN: usize = 36;

/// Parse a region or beacon identifier.
///
/// Accepts the hyphenated form only (`8-4-4-4-12` hex digits, any case).
/// Returns `None` for anything else, including the braced, URN and simple
/// forms the `uuid` crate would otherwise tolerate.
#[must_use]
pub fn parse_identifier(text: &str) -> Option<Uuid> {
    if text.len() != HYPHENATED_UUID_LEN {
        return None;
    }
    Uuid::try_parse(text).ok()
}

/// Canonical text form of an identifier (uppercase, hyphenated).
#[must_use]
pub fn canonical_identifier(uuid: &Uuid) -> String {
    format!("{:X}", uuid.hyphenated())
}

/// Identity of a single beacon: its broadcast UUID plus major/minor numbers.
///
/// A region is identified by the UUID alone; a beacon by all three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeaconIdentity {
    /// Broadcast identifier shared by every beacon of a region.
    pub uuid: Uuid,
    /// Major number, usually a site or group.
    pub major: u16,
    /// Minor number, usually an individual beacon.
    pub minor: u16,
}

impl BeaconIdentity {
    /// Create a new identity.
    #[must_use]
    pub const fn new(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self { uuid, major, minor }
    }

    /// Canonical text form of the UUID part.
    #[must_use]
    pub fn uuid_string(&self) -> String {
        canonical_identifier(&self.uuid)
    }
}

impl fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}:{}:{}", self.uuid.hyphenated(), self.major, self.minor)
    }
}

/// Coarse distance category reported for a sighting.
///
/// The integer codes follow the platform convention and are fixed:
///
/// | level     | code |
/// |-----------|------|
/// | Unknown   | 0    |
/// | Immediate | 1    |
/// | Near      | 2    |
/// | Far       | 3    |
///
/// Ranking is a separate notion, see [`ProximityLevel::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProximityLevel {
    /// Within a few centimetres.
    Immediate,
    /// Within a couple of metres.
    Near,
    /// Detected, but further away or with a weak signal.
    Far,
    /// Distance could not be determined.
    #[default]
    Unknown,
}

impl ProximityLevel {
    /// Wire code of this level.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Immediate => 1,
            Self::Near => 2,
            Self::Far => 3,
        }
    }

    /// Decode a wire code. Unrecognised codes decode as [`Self::Unknown`].
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Immediate,
            2 => Self::Near,
            3 => Self::Far,
            _ => Self::Unknown,
        }
    }

    /// Closeness rank; higher is closer. `Immediate > Near > Far > Unknown`.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Immediate => 3,
            Self::Near => 2,
            Self::Far => 1,
            Self::Unknown => 0,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Immediate => "Immediate",
            Self::Near => "Near",
            Self::Far => "Far",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the distance was determined at all.
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for ProximityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One sighting as delivered by the signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSighting {
    /// Which beacon was seen.
    pub identity: BeaconIdentity,
    /// Reported distance category.
    pub proximity: ProximityLevel,
    /// Received signal strength in dBm; higher is stronger.
    pub rssi: i16,
}

impl RawSighting {
    /// Create a new sighting.
    #[must_use]
    pub const fn new(identity: BeaconIdentity, proximity: ProximityLevel, rssi: i16) -> Self {
        Self {
            identity,
            proximity,
            rssi,
        }
    }

    /// Best-first ordering: closer proximity first, then stronger signal.
    #[must_use]
    pub fn cmp_best_first(&self, other: &Self) -> Ordering {
        other
            .proximity
            .rank()
            .cmp(&self.proximity.rank())
            .then_with(|| other.rssi.cmp(&self.rssi))
    }
}

/// A ranged beacon as handed to a region's subscriber.
///
/// Equality compares identity and proximity only; two samples of the same
/// beacon at the same proximity are equal whenever they were observed.
#[derive(Debug, Clone, Copy)]
pub struct ProximitySample {
    /// When the sighting was processed.
    pub timestamp: DateTime<Utc>,
    /// Which beacon was seen.
    pub identity: BeaconIdentity,
    /// Distance category at that time.
    pub proximity: ProximityLevel,
}

impl ProximitySample {
    /// Build a sample from a raw sighting observed at `timestamp`.
    #[must_use]
    pub const fn from_sighting(sighting: &RawSighting, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            identity: sighting.identity,
            proximity: sighting.proximity,
        }
    }

    /// Whether this sample belongs to the given beacon, ignoring proximity.
    #[must_use]
    pub fn represents(&self, identity: &BeaconIdentity) -> bool {
        self.identity == *identity
    }

    /// Short one-line form used in logs.
    #[must_use]
    pub fn description(&self) -> String {
        format!(
            "P:{} | Mi:{} | Ma:{} | {}",
            self.proximity,
            self.identity.minor,
            self.identity.major,
            self.timestamp.format("%I:%M:%S")
        )
    }

    /// Wire record for this sample.
    #[must_use]
    pub fn to_event(&self) -> ProximityEvent {
        ProximityEvent::from(self)
    }
}

impl PartialEq for ProximitySample {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.proximity == other.proximity
    }
}

impl Eq for ProximitySample {}

/// Wire record of a ranged beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximityEvent {
    /// Observation time in milliseconds since the Unix epoch.
    pub time_stamp: i64,
    /// Canonical beacon UUID.
    pub uuid: String,
    /// Major number.
    pub major: u16,
    /// Minor number.
    pub minor: u16,
    /// Proximity code (0 = Unknown, 1 = Immediate, 2 = Near, 3 = Far).
    pub proximity: u8,
}

impl From<&ProximitySample> for ProximityEvent {
    fn from(sample: &ProximitySample) -> Self {
        Self {
            time_stamp: sample.timestamp.timestamp_millis(),
            uuid: sample.identity.uuid_string(),
            major: sample.identity.major,
            minor: sample.identity.minor,
            proximity: sample.proximity.code(),
        }
    }
}

impl TryFrom<ProximityEvent> for ProximitySample {
    type Error = BeaconError;

    fn try_from(event: ProximityEvent) -> Result<Self> {
        let uuid = parse_identifier(&event.uuid)
            .ok_or_else(|| BeaconError::invalid_identifier(&event.uuid, "proximity event"))?;
        let timestamp = DateTime::from_timestamp_millis(event.time_stamp).ok_or_else(|| {
            BeaconError::PersistenceError(format!(
                "event timestamp {} is out of range",
                event.time_stamp
            ))
        })?;
        Ok(Self {
            timestamp,
            identity: BeaconIdentity::new(uuid, event.major, event.minor),
            proximity: ProximityLevel::from_code(i64::from(event.proximity)),
        })
    }
}

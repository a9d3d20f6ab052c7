//! Per-batch filtering and ranking of raw sightings.
//!
//! [`process`] is a pure function of one batch and one region's policy.
//! Output is best-first:
//!
//! 1. stable sort by proximity rank (closest first), then by RSSI (strongest first)
//! 2. drop unknown-proximity sightings unless the region asks for them
//! 3. truncate to the region's limit, if any
//!
//! The limit is applied last, so it bounds the number of samples actually
//! emitted and always keeps the best ones.

use chrono::{DateTime, Utc};

use crate::types::{ProximitySample, RawSighting};

/// Filtering knobs taken from a monitored region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangingPolicy {
    /// Report sightings whose proximity is unknown.
    pub include_unknown: bool,
    /// Maximum samples per batch; 0 means unbounded.
    pub limit: u32,
}

impl RangingPolicy {
    fn max_samples(self) -> Option<usize> {
        match self.limit {
            0 => None,
            n => Some(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }
}

/// Turn one batch of raw sightings into the samples to emit, best first.
#[must_use]
pub fn process(
    sightings: &[RawSighting],
    policy: RangingPolicy,
    observed_at: DateTime<Utc>,
) -> Vec<ProximitySample> {
    let mut ranked: Vec<&RawSighting> = sightings.iter().collect();
    ranked.sort_by(|a, b| a.cmp_best_first(b));

    let accepted = ranked
        .into_iter()
        .filter(|sighting| policy.include_unknown || sighting.proximity.is_known())
        .map(|sighting| ProximitySample::from_sighting(sighting, observed_at));

    match policy.max_samples() {
        Some(limit) => accepted.take(limit).collect(),
        None => accepted.collect(),
    }
}

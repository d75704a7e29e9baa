use std::collections::BTreeMap;
use std::time::Duration;

use super::ring::SnapshotRing;
use super::types::{KeyedSnapshots, Metrics, Snapshot, Unavailable};

/// `current - previous`, or 0 when the counter went backwards (reset,
/// re-enable, hot-unplug).
pub fn counter_delta(previous: u64, current: u64) -> u64 {
    if current < previous {
        0
    } else {
        current - previous
    }
}

/// `100 * part / whole`, with 0 for a zero or non-finite whole.
pub fn compute_percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 || !whole.is_finite() || !part.is_finite() {
        0.0
    } else {
        100.0 * part / whole
    }
}

/// `numerator / denominator`, with 0 for a zero denominator.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        0.0
    } else {
        numerator / denominator
    }
}

fn elapsed_between(previous: &Snapshot, current: &Snapshot) -> Option<Duration> {
    current
        .timestamp()
        .checked_duration_since(previous.timestamp())
        .filter(|elapsed| !elapsed.is_zero())
}

/// Per-second rate of one counter, or `None` when the elapsed time is not
/// positive or either snapshot lacks the counter.
pub fn compute_rate(previous: &Snapshot, current: &Snapshot, counter: &str) -> Option<f64> {
    let elapsed = elapsed_between(previous, current)?;
    let delta = counter_delta(previous.counter(counter)?, current.counter(counter)?);
    Some(delta as f64 / elapsed.as_secs_f64())
}

/// Counter deltas between two snapshots plus the current gauges.
#[derive(Clone, Debug, PartialEq)]
pub struct Deltas {
    deltas: BTreeMap<String, u64>,
    gauges: BTreeMap<String, u64>,
    elapsed: Duration,
}

impl Deltas {
    /// `None` means at least one snapshot lacked the counter.
    pub fn delta(&self, name: &str) -> Option<u64> {
        self.deltas.get(name).copied()
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        self.delta(name)
            .map(|delta| delta as f64 / self.elapsed.as_secs_f64())
    }

    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).copied()
    }

    /// Sum of the named deltas, or `None` if any is missing.
    pub fn total(&self, names: &[&str]) -> Option<u64> {
        names
            .iter()
            .try_fold(0u64, |sum, name| Some(sum.saturating_add(self.delta(name)?)))
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Turns pairs of snapshots into deltas. Holds no state.
pub struct DeltaEngine;

impl DeltaEngine {
    pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Metrics<Deltas> {
        let Some(previous) = previous else {
            return Metrics::Unavailable(Unavailable::FirstSample);
        };
        let Some(elapsed) = elapsed_between(previous, current) else {
            return Metrics::Unavailable(Unavailable::ZeroElapsed);
        };

        let deltas = current
            .counters()
            .filter_map(|(name, value)| {
                let before = previous.counter(name)?;
                Some((name.to_string(), counter_delta(before, value)))
            })
            .collect();
        let gauges = current
            .gauges()
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        Metrics::Ready(Deltas {
            deltas,
            gauges,
            elapsed,
        })
    }

    /// Diffs every entity in `current` against its previous reading. Entities
    /// that appeared this tick report `FirstSample`; ones that vanished are
    /// dropped.
    pub fn diff_keyed<K: Ord + Clone>(
        previous: Option<&KeyedSnapshots<K>>,
        current: &KeyedSnapshots<K>,
    ) -> Metrics<BTreeMap<K, Metrics<Deltas>>> {
        let Some(previous) = previous else {
            return Metrics::Unavailable(Unavailable::FirstSample);
        };
        Metrics::Ready(
            current
                .iter()
                .map(|(key, snapshot)| (key.clone(), Self::diff(previous.get(key), snapshot)))
                .collect(),
        )
    }

    pub fn diff_ring(ring: &SnapshotRing<Snapshot>) -> Metrics<Deltas> {
        match ring.current() {
            Some(current) => Self::diff(ring.previous(), current),
            None => Metrics::Unavailable(Unavailable::FirstSample),
        }
    }

    pub fn diff_keyed_ring<K: Ord + Clone>(
        ring: &SnapshotRing<KeyedSnapshots<K>>,
    ) -> Metrics<BTreeMap<K, Metrics<Deltas>>> {
        match ring.current() {
            Some(current) => Self::diff_keyed(ring.previous(), current),
            None => Metrics::Unavailable(Unavailable::FirstSample),
        }
    }
}

use std::fmt::Display;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{info, warn};

use super::ring::SnapshotRing;
use super::types::{Metrics, SampleEnvelope};

/// Previous/current readings of one source plus whether the last read failed.
///
/// A failed read clears the ring, so the tick after recovery is a first
/// sample again instead of a diff across the outage.
#[derive(Debug)]
pub struct SourceState<T> {
    ring: SnapshotRing<T>,
    failing: bool,
    source: &'static str,
}

impl<T> SourceState<T> {
    pub fn new(source: &'static str) -> Self {
        SourceState {
            ring: SnapshotRing::new(),
            failing: false,
            source,
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn ring(&self) -> &SnapshotRing<T> {
        &self.ring
    }

    pub fn record(&mut self, value: T) {
        if self.failing {
            info!("{} readable again", self.source);
            self.failing = false;
        }
        self.ring.push(value);
    }

    pub fn record_failure(&mut self, error: &dyn Display) {
        if !self.failing {
            warn!("{} unavailable: {}", self.source, error);
            self.failing = true;
        }
        self.ring.clear();
    }

    pub fn is_failing(&self) -> bool {
        self.failing
    }

    /// Records `reading` and wraps what `compute` makes of the ring, or
    /// records the failure and returns an errored envelope.
    pub fn collect<M, E: Display>(
        &mut self,
        started: Instant,
        valid_for: Duration,
        reading: Result<T, E>,
        compute: impl FnOnce(&SnapshotRing<T>) -> Metrics<M>,
    ) -> SampleEnvelope<M> {
        match reading {
            Ok(value) => {
                self.record(value);
                let metrics = compute(&self.ring);
                SampleEnvelope::fresh(
                    metrics,
                    Utc::now(),
                    valid_for,
                    started.elapsed(),
                    self.source,
                )
            }
            Err(error) => {
                self.record_failure(&error);
                SampleEnvelope::errored(
                    Utc::now(),
                    valid_for,
                    started.elapsed(),
                    self.source,
                    error.to_string(),
                )
            }
        }
    }
}

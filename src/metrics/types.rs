use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// A named set of raw readings taken at one monotonic instant.
///
/// Counters only ever grow (modulo wraparound) and are differenced between
/// snapshots; gauges are point-in-time levels read from the current snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, u64>,
    timestamp: Instant,
}

impl Snapshot {
    pub fn new(timestamp: Instant) -> Self {
        Snapshot {
            counters: BTreeMap::new(),
            gauges: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn with_counter(mut self, name: impl Into<String>, value: u64) -> Self {
        self.set_counter(name, value);
        self
    }

    pub fn with_gauge(mut self, name: impl Into<String>, value: u64) -> Self {
        self.set_gauge(name, value);
        self
    }

    pub fn set_counter(&mut self, name: impl Into<String>, value: u64) {
        self.counters.insert(name.into(), value);
    }

    pub fn set_gauge(&mut self, name: impl Into<String>, value: u64) {
        self.gauges.insert(name.into(), value);
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).copied()
    }

    pub fn counters(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn gauges(&self) -> impl Iterator<Item = (&str, u64)> {
        self.gauges.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

/// Snapshots of several entities (devices, processes, interrupt lines) taken
/// in the same pass.
pub type KeyedSnapshots<K> = BTreeMap<K, Snapshot>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    /// No previous snapshot to difference against.
    FirstSample,
    /// Both snapshots carry the same timestamp.
    ZeroElapsed,
    /// The underlying source could not be read this tick.
    SourceAbsent,
    /// The domain is switched off in configuration.
    Disabled,
}

impl Unavailable {
    pub fn describe(self) -> &'static str {
        match self {
            Unavailable::FirstSample => "first sample",
            Unavailable::ZeroElapsed => "zero elapsed time",
            Unavailable::SourceAbsent => "source unavailable",
            Unavailable::Disabled => "disabled",
        }
    }
}

/// Either computed values or the reason none exist. Readers never see a
/// zero standing in for "no data".
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Metrics<T> {
    Ready(T),
    Unavailable(Unavailable),
}

impl<T> Metrics<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Metrics::Ready(value) => Some(value),
            Metrics::Unavailable(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Metrics::Ready(_))
    }

    pub fn unavailable(&self) -> Option<Unavailable> {
        match self {
            Metrics::Ready(_) => None,
            Metrics::Unavailable(reason) => Some(*reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Metrics<U> {
        match self {
            Metrics::Ready(value) => Metrics::Ready(f(value)),
            Metrics::Unavailable(reason) => Metrics::Unavailable(reason),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Metrics<U>) -> Metrics<U> {
        match self {
            Metrics::Ready(value) => f(value),
            Metrics::Unavailable(reason) => Metrics::Unavailable(reason),
        }
    }
}

/// One domain's result for a tick, with provenance.
#[derive(Clone, Debug, Serialize)]
pub struct SampleEnvelope<T> {
    pub value: Metrics<T>,
    pub collected_at: DateTime<Utc>,
    pub valid_for_ms: u32,
    pub source: String,
    pub latency_ms: u32,
    pub error: Option<String>,
}

fn clamp_ms(duration: Duration) -> u32 {
    duration.as_millis().min(u32::MAX as u128) as u32
}

impl<T> SampleEnvelope<T> {
    pub fn fresh(
        value: Metrics<T>,
        collected_at: DateTime<Utc>,
        valid_for: Duration,
        latency: Duration,
        source: &str,
    ) -> Self {
        SampleEnvelope {
            value,
            collected_at,
            valid_for_ms: clamp_ms(valid_for),
            source: source.to_string(),
            latency_ms: clamp_ms(latency),
            error: None,
        }
    }

    pub fn errored(
        collected_at: DateTime<Utc>,
        valid_for: Duration,
        latency: Duration,
        source: &str,
        error: String,
    ) -> Self {
        SampleEnvelope {
            value: Metrics::Unavailable(Unavailable::SourceAbsent),
            collected_at,
            valid_for_ms: clamp_ms(valid_for),
            source: source.to_string(),
            latency_ms: clamp_ms(latency),
            error: Some(error),
        }
    }

    pub fn disabled(collected_at: DateTime<Utc>, source: &str) -> Self {
        SampleEnvelope {
            value: Metrics::Unavailable(Unavailable::Disabled),
            collected_at,
            valid_for_ms: 0,
            source: source.to_string(),
            latency_ms: 0,
            error: None,
        }
    }

    pub fn ready(&self) -> Option<&T> {
        self.value.ready()
    }
}

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::procfs::{CpuTimes, ProcFs};

use super::delta::{compute_percent, DeltaEngine, Deltas};
use super::source::SourceState;
use super::types::{SampleEnvelope, Snapshot};

pub const CPU_BUCKETS: [&str; 10] = [
    "user",
    "nice",
    "system",
    "idle",
    "iowait",
    "irq",
    "softirq",
    "steal",
    "guest",
    "guest_nice",
];

/// Share of CPU time per bucket over the tick, each 0-100.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CpuMetrics {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
    /// Everything but idle.
    pub usage: f64,
    pub total_ticks: u64,
}

pub fn cpu_snapshot(times: &CpuTimes, at: Instant) -> Snapshot {
    times
        .buckets()
        .into_iter()
        .fold(Snapshot::new(at), |snapshot, (name, value)| {
            snapshot.with_counter(name, value)
        })
}

/// Buckets are normalised by the summed delta of all ten; a tick in which
/// no bucket moved reports all zeros.
pub fn cpu_metrics(deltas: &Deltas) -> CpuMetrics {
    let total = deltas.total(&CPU_BUCKETS).unwrap_or(0);
    let whole = total as f64;
    let share = |bucket: &str| compute_percent(deltas.delta(bucket).unwrap_or(0) as f64, whole);
    let idle_ticks = deltas.delta("idle").unwrap_or(0);

    CpuMetrics {
        user: share("user"),
        nice: share("nice"),
        system: share("system"),
        idle: share("idle"),
        iowait: share("iowait"),
        irq: share("irq"),
        softirq: share("softirq"),
        steal: share("steal"),
        guest: share("guest"),
        guest_nice: share("guest_nice"),
        usage: compute_percent(total.saturating_sub(idle_ticks) as f64, whole),
        total_ticks: total,
    }
}

pub fn collect_cpu_sample(
    procfs: &ProcFs,
    state: &mut SourceState<Snapshot>,
    valid_for: Duration,
) -> SampleEnvelope<CpuMetrics> {
    let started = Instant::now();
    let reading = procfs
        .read_cpu_times()
        .map(|times| cpu_snapshot(&times, Instant::now()));

    state.collect(started, valid_for, reading, |ring| {
        DeltaEngine::diff_ring(ring).map(|deltas| cpu_metrics(&deltas))
    })
}

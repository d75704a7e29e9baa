use std::time::{Duration, Instant};

use serde::Serialize;

use crate::procfs::{MemInfo, ProcFs};

use super::delta::compute_percent;
use super::source::SourceState;
use super::types::{Metrics, SampleEnvelope, Snapshot, Unavailable};

/// Memory accounting for the current tick. Sizes are kB, shares are 0-100.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MemoryMetrics {
    pub total_kb: u64,
    pub free_kb: u64,
    pub available_kb: u64,
    pub buffers_kb: u64,
    pub cached_kb: u64,
    pub dirty_kb: u64,
    pub writeback_kb: u64,
    pub usage_percent: f64,
    pub available_percent: f64,
    /// Buffers as a share of buffers + page cache.
    pub buffer_efficiency: f64,
    /// Page cache as a share of buffers + page cache.
    pub cache_efficiency: f64,
    pub dirty_percent: f64,
    pub writeback_percent: f64,
    /// Buffers + page cache as a share of total memory.
    pub cache_percent: f64,
}

pub fn memory_snapshot(info: &MemInfo, at: Instant) -> Snapshot {
    Snapshot::new(at)
        .with_gauge("total", info.total)
        .with_gauge("free", info.free)
        .with_gauge("available", info.available)
        .with_gauge("buffers", info.buffers)
        .with_gauge("cached", info.cached)
        .with_gauge("swap_cached", info.swap_cached)
        .with_gauge("active", info.active)
        .with_gauge("inactive", info.inactive)
        .with_gauge("dirty", info.dirty)
        .with_gauge("writeback", info.writeback)
}

/// Memory figures are levels, not counters, so they are ready from the first
/// snapshot.
pub fn memory_metrics(snapshot: &Snapshot) -> MemoryMetrics {
    let gauge = |name: &str| snapshot.gauge(name).unwrap_or(0);
    let total = gauge("total");
    let available = gauge("available");
    let buffers = gauge("buffers");
    let cached = gauge("cached");
    let dirty = gauge("dirty");
    let writeback = gauge("writeback");
    let whole = total as f64;
    let cache_total = buffers.saturating_add(cached) as f64;

    MemoryMetrics {
        total_kb: total,
        free_kb: gauge("free"),
        available_kb: available,
        buffers_kb: buffers,
        cached_kb: cached,
        dirty_kb: dirty,
        writeback_kb: writeback,
        usage_percent: compute_percent(total.saturating_sub(available) as f64, whole),
        available_percent: compute_percent(available as f64, whole),
        buffer_efficiency: compute_percent(buffers as f64, cache_total),
        cache_efficiency: compute_percent(cached as f64, cache_total),
        dirty_percent: compute_percent(dirty as f64, whole),
        writeback_percent: compute_percent(writeback as f64, whole),
        cache_percent: compute_percent(cache_total, whole),
    }
}

pub fn collect_memory_sample(
    procfs: &ProcFs,
    state: &mut SourceState<Snapshot>,
    valid_for: Duration,
) -> SampleEnvelope<MemoryMetrics> {
    let started = Instant::now();
    let reading = procfs
        .read_meminfo()
        .map(|info| memory_snapshot(&info, Instant::now()));

    state.collect(started, valid_for, reading, |ring| match ring.current() {
        Some(current) => Metrics::Ready(memory_metrics(current)),
        None => Metrics::Unavailable(Unavailable::SourceAbsent),
    })
}

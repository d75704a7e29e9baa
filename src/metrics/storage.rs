use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;

use crate::config::{QueueCapacitySource, StorageThresholds};
use crate::procfs::{DiskStats, ProcFs};

use super::delta::{compute_percent, ratio, DeltaEngine, Deltas};
use super::source::SourceState;
use super::types::{KeyedSnapshots, Metrics, SampleEnvelope, Snapshot};

pub const SECTOR_BYTES: f64 = 512.0;
const MIB: f64 = 1024.0 * 1024.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeviceMetrics {
    pub device: String,
    pub read_iops: f64,
    pub write_iops: f64,
    pub total_iops: f64,
    pub read_mbps: f64,
    pub write_mbps: f64,
    /// Completed reads + writes this tick; zero means the device was idle.
    pub completed_ios: u64,
    /// Mean time per completed I/O including queueing, ms.
    pub await_ms: f64,
    /// Mean busy time per completed I/O, ms.
    pub service_time_ms: f64,
    pub utilization_percent: f64,
    /// Time-averaged number of requests in flight.
    pub avg_queue_size: f64,
    pub queue_depth: u64,
    pub queue_capacity: u64,
    pub queue_utilization_percent: f64,
    /// Active I/O scheduler, when the block layer reports one.
    pub scheduler: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StorageMetrics {
    pub devices: Vec<DeviceMetrics>,
    /// Devices seen for the first time this tick.
    pub warming_up: Vec<String>,
}

impl StorageMetrics {
    pub fn total_iops(&self) -> f64 {
        self.devices.iter().map(|device| device.total_iops).sum()
    }
}

pub fn storage_snapshot(
    disks: &[DiskStats],
    capacity_of: impl Fn(&str) -> u64,
    at: Instant,
) -> KeyedSnapshots<String> {
    disks
        .iter()
        .map(|disk| {
            let snapshot = Snapshot::new(at)
                .with_counter("reads", disk.reads_completed)
                .with_counter("read_merges", disk.reads_merged)
                .with_counter("read_sectors", disk.sectors_read)
                .with_counter("read_time_ms", disk.read_time_ms)
                .with_counter("writes", disk.writes_completed)
                .with_counter("write_merges", disk.writes_merged)
                .with_counter("write_sectors", disk.sectors_written)
                .with_counter("write_time_ms", disk.write_time_ms)
                .with_counter("io_time_ms", disk.io_time_ms)
                .with_counter("weighted_io_time_ms", disk.weighted_io_time_ms)
                .with_gauge("io_in_progress", disk.io_in_progress)
                .with_gauge("queue_capacity", capacity_of(&disk.device));
            (disk.device.clone(), snapshot)
        })
        .collect()
}

pub fn device_metrics(device: &str, deltas: &Deltas) -> DeviceMetrics {
    let delta = |name: &str| deltas.delta(name).unwrap_or(0);
    let rate = |name: &str| deltas.rate(name).unwrap_or(0.0);
    let elapsed_ms = deltas.elapsed_secs() * 1000.0;

    let completed_ios = delta("reads").saturating_add(delta("writes"));
    let ios = completed_ios as f64;
    let queue_depth = deltas.gauge("io_in_progress").unwrap_or(0);
    let queue_capacity = deltas.gauge("queue_capacity").unwrap_or(0);

    DeviceMetrics {
        device: device.to_string(),
        read_iops: rate("reads"),
        write_iops: rate("writes"),
        total_iops: rate("reads") + rate("writes"),
        read_mbps: rate("read_sectors") * SECTOR_BYTES / MIB,
        write_mbps: rate("write_sectors") * SECTOR_BYTES / MIB,
        completed_ios,
        await_ms: ratio(
            delta("read_time_ms").saturating_add(delta("write_time_ms")) as f64,
            ios,
        ),
        service_time_ms: ratio(delta("io_time_ms") as f64, ios),
        utilization_percent: compute_percent(delta("io_time_ms") as f64, elapsed_ms).min(100.0),
        avg_queue_size: ratio(delta("weighted_io_time_ms") as f64, elapsed_ms),
        queue_depth,
        queue_capacity,
        queue_utilization_percent: compute_percent(queue_depth as f64, queue_capacity as f64),
        scheduler: None,
    }
}

pub fn collect_storage_sample(
    procfs: &ProcFs,
    pattern: &Regex,
    thresholds: &StorageThresholds,
    state: &mut SourceState<KeyedSnapshots<String>>,
    valid_for: Duration,
) -> SampleEnvelope<StorageMetrics> {
    let started = Instant::now();
    let capacity_of = |device: &str| match thresholds.queue_capacity {
        QueueCapacitySource::Fixed => thresholds.max_queue_depth,
        QueueCapacitySource::Device => procfs
            .read_queue_capacity(device)
            .unwrap_or(thresholds.max_queue_depth),
    };
    let reading = procfs
        .read_diskstats(pattern)
        .map(|disks| storage_snapshot(&disks, capacity_of, Instant::now()));

    state.collect(started, valid_for, reading, |ring| {
        DeltaEngine::diff_keyed_ring(ring).map(|per_device| {
            let mut metrics = StorageMetrics::default();
            for (device, deltas) in per_device {
                match deltas {
                    Metrics::Ready(deltas) => {
                        let mut entry = device_metrics(&device, &deltas);
                        entry.scheduler = procfs.read_scheduler(&device);
                        metrics.devices.push(entry);
                    }
                    Metrics::Unavailable(_) => metrics.warming_up.push(device),
                }
            }
            metrics
        })
    })
}

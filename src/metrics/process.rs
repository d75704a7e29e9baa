use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::procfs::{self, ProcFs, ProcessSample};

use super::delta::{compute_percent, ratio, DeltaEngine, Deltas};
use super::source::SourceState;
use super::types::{KeyedSnapshots, Metrics, SampleEnvelope, Snapshot, Unavailable};

const MIB: f64 = 1024.0 * 1024.0;

/// Kernel units needed to turn raw process counters into seconds and bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessUnits {
    pub clock_ticks_per_sec: u64,
    pub page_size: u64,
}

impl ProcessUnits {
    pub fn from_system() -> Self {
        ProcessUnits {
            clock_ticks_per_sec: procfs::clock_ticks_per_sec(),
            page_size: procfs::page_size(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessLabel {
    pub comm: String,
    pub state: char,
}

#[derive(Clone, Debug, Default)]
pub struct ProcessTable {
    pub snapshots: KeyedSnapshots<u32>,
    pub labels: BTreeMap<u32, ProcessLabel>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProcessMetrics {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub threads: u64,
    /// Share of one CPU; a busy multi-threaded process can exceed 100.
    pub cpu_percent: f64,
    pub rss_mb: f64,
    pub vsize_mb: f64,
    /// Share of user time in this tick's CPU time.
    pub user_time_percent: f64,
    pub context_switch_rate: f64,
    pub page_fault_rate: f64,
    /// Fields below are `None` when `/proc/<pid>/io` was not readable.
    pub read_bytes_rate: Option<f64>,
    pub write_bytes_rate: Option<f64>,
    /// Share of read() bytes served without touching storage.
    pub cache_hit_rate: Option<f64>,
    /// Storage bytes per read syscall.
    pub bytes_per_read_syscall: Option<f64>,
}

impl ProcessMetrics {
    pub fn io_rate(&self) -> f64 {
        self.read_bytes_rate.unwrap_or(0.0) + self.write_bytes_rate.unwrap_or(0.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProcessesMetrics {
    pub processes: Vec<ProcessMetrics>,
    /// Processes that appeared this tick.
    pub warming_up: usize,
    pub top_cpu: Vec<u32>,
    pub top_memory: Vec<u32>,
    pub top_io: Vec<u32>,
}

impl ProcessesMetrics {
    pub fn get(&self, pid: u32) -> Option<&ProcessMetrics> {
        self.processes.iter().find(|process| process.pid == pid)
    }
}

pub fn process_table(samples: &[ProcessSample], at: Instant) -> ProcessTable {
    let mut table = ProcessTable::default();
    for sample in samples {
        let mut snapshot = Snapshot::new(at)
            .with_counter("utime", sample.utime)
            .with_counter("stime", sample.stime)
            .with_counter("minflt", sample.minflt)
            .with_counter("majflt", sample.majflt)
            .with_counter("voluntary_ctxt_switches", sample.voluntary_ctxt_switches)
            .with_counter("nonvoluntary_ctxt_switches", sample.nonvoluntary_ctxt_switches)
            .with_gauge("num_threads", sample.num_threads)
            .with_gauge("vsize_bytes", sample.vsize_bytes)
            .with_gauge("rss_pages", sample.rss_pages);
        if let Some(io) = sample.io {
            snapshot.set_counter("rchar", io.rchar);
            snapshot.set_counter("wchar", io.wchar);
            snapshot.set_counter("syscr", io.syscr);
            snapshot.set_counter("syscw", io.syscw);
            snapshot.set_counter("read_bytes", io.read_bytes);
            snapshot.set_counter("write_bytes", io.write_bytes);
        }
        table.snapshots.insert(sample.pid, snapshot);
        table.labels.insert(
            sample.pid,
            ProcessLabel {
                comm: sample.comm.clone(),
                state: sample.state,
            },
        );
    }
    table
}

pub fn process_metrics(
    pid: u32,
    label: Option<&ProcessLabel>,
    deltas: &Deltas,
    units: ProcessUnits,
) -> ProcessMetrics {
    let delta = |name: &str| deltas.delta(name).unwrap_or(0);
    let gauge = |name: &str| deltas.gauge(name).unwrap_or(0);
    let elapsed = deltas.elapsed_secs();

    let cpu_ticks = delta("utime").saturating_add(delta("stime"));
    let cpu_seconds = ratio(cpu_ticks as f64, units.clock_ticks_per_sec as f64);

    let rchar = deltas.delta("rchar");
    let read_bytes = deltas.delta("read_bytes");
    let cache_hit_rate = match (rchar, read_bytes) {
        (Some(rchar), Some(read_bytes)) => Some(
            compute_percent(rchar.saturating_sub(read_bytes) as f64, rchar as f64),
        ),
        _ => None,
    };
    let bytes_per_read_syscall = match (read_bytes, deltas.delta("syscr")) {
        (Some(read_bytes), Some(syscr)) => Some(ratio(read_bytes as f64, syscr as f64)),
        _ => None,
    };

    ProcessMetrics {
        pid,
        comm: label.map(|l| l.comm.clone()).unwrap_or_default(),
        state: label.map(|l| l.state).unwrap_or('?'),
        threads: gauge("num_threads"),
        cpu_percent: compute_percent(cpu_seconds, elapsed),
        rss_mb: gauge("rss_pages").saturating_mul(units.page_size) as f64 / MIB,
        vsize_mb: gauge("vsize_bytes") as f64 / MIB,
        user_time_percent: compute_percent(delta("utime") as f64, cpu_ticks as f64),
        context_switch_rate: ratio(
            delta("voluntary_ctxt_switches")
                .saturating_add(delta("nonvoluntary_ctxt_switches")) as f64,
            elapsed,
        ),
        page_fault_rate: ratio(delta("minflt").saturating_add(delta("majflt")) as f64, elapsed),
        read_bytes_rate: deltas.rate("read_bytes"),
        write_bytes_rate: deltas.rate("write_bytes"),
        cache_hit_rate,
        bytes_per_read_syscall,
    }
}

fn top_by(
    processes: &[ProcessMetrics],
    n: usize,
    key: impl Fn(&ProcessMetrics) -> f64,
) -> Vec<u32> {
    let mut ranked: Vec<&ProcessMetrics> = processes.iter().collect();
    ranked.sort_by(|a, b| {
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(Ordering::Equal)
            .then(a.pid.cmp(&b.pid))
    });
    ranked.into_iter().take(n).map(|process| process.pid).collect()
}

pub fn processes_metrics(
    per_pid: BTreeMap<u32, Metrics<Deltas>>,
    labels: &BTreeMap<u32, ProcessLabel>,
    units: ProcessUnits,
    top_n: usize,
) -> ProcessesMetrics {
    let mut metrics = ProcessesMetrics::default();
    for (pid, deltas) in per_pid {
        match deltas {
            Metrics::Ready(deltas) => metrics
                .processes
                .push(process_metrics(pid, labels.get(&pid), &deltas, units)),
            Metrics::Unavailable(_) => metrics.warming_up += 1,
        }
    }
    metrics.top_cpu = top_by(&metrics.processes, top_n, |p| p.cpu_percent);
    metrics.top_memory = top_by(&metrics.processes, top_n, |p| p.rss_mb);
    metrics.top_io = top_by(&metrics.processes, top_n, ProcessMetrics::io_rate);
    metrics
}

pub fn collect_process_sample(
    procfs: &ProcFs,
    units: ProcessUnits,
    top_n: usize,
    state: &mut SourceState<ProcessTable>,
    valid_for: Duration,
) -> SampleEnvelope<ProcessesMetrics> {
    let started = Instant::now();
    let reading = procfs
        .read_processes()
        .map(|samples| process_table(&samples, Instant::now()));

    state.collect(started, valid_for, reading, |ring| {
        let Some(current) = ring.current() else {
            return Metrics::Unavailable(Unavailable::FirstSample);
        };
        DeltaEngine::diff_keyed(ring.previous().map(|table| &table.snapshots), &current.snapshots)
            .map(|per_pid| processes_metrics(per_pid, &current.labels, units, top_n))
    })
}

use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;

use crate::config::PressureWeights;
use crate::procfs::{NodeInfo, ProcFs, SourceError, VmStat};

use super::delta::{compute_percent, DeltaEngine, Deltas};
use super::source::SourceState;
use super::types::{Metrics, SampleEnvelope, Snapshot, Unavailable};

/// One tick of VM counters plus the node layout read alongside them.
#[derive(Clone, Debug)]
pub struct NumaSample {
    pub vmstat: Snapshot,
    pub nodes: Vec<NodeInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NodeMetrics {
    pub id: u32,
    pub total_kb: u64,
    pub free_kb: u64,
    pub used_kb: u64,
    pub usage_percent: f64,
    pub cpus: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NumaMetrics {
    pub page_fault_rate: f64,
    pub major_fault_rate: f64,
    pub page_in_rate: f64,
    pub page_out_rate: f64,
    pub swap_in_rate: f64,
    pub swap_out_rate: f64,
    /// Pages swapped in + out this tick.
    pub swap_pages: u64,
    pub scan_rate: f64,
    pub steal_rate: f64,
    pub dirty_pages: u64,
    pub writeback_pages: u64,
    pub unstable_pages: u64,
    pub slab_reclaimable_pages: u64,
    pub slab_unreclaimable_pages: u64,
    pub pressure_score: f64,
    pub nodes: Vec<NodeMetrics>,
    /// Spread between the most and least used node; `None` with fewer than
    /// two nodes.
    pub imbalance_percent: Option<f64>,
}

impl NumaMetrics {
    pub fn is_swapping(&self) -> bool {
        self.swap_pages > 0
    }
}

pub fn vmstat_snapshot(vmstat: &VmStat, at: Instant) -> Snapshot {
    let mut snapshot = Snapshot::new(at);
    for key in ["pgfault", "pgmajfault", "pgpgin", "pgpgout", "pswpin", "pswpout"] {
        if let Some(value) = vmstat.get(key) {
            snapshot.set_counter(key, value);
        }
    }
    // pgsteal was split per reclaimer in 4.x
    if let Some(value) = vmstat
        .get("pgsteal")
        .or_else(|| vmstat.sum_of(&["pgsteal_kswapd", "pgsteal_direct"]))
    {
        snapshot.set_counter("pgsteal", value);
    }
    if let Some(value) = vmstat.sum_of(&["pgscan_kswapd", "pgscan_direct"]) {
        snapshot.set_counter("pgscan", value);
    }
    for key in [
        "nr_dirty",
        "nr_writeback",
        "nr_unstable",
        "nr_slab_reclaimable",
        "nr_slab_unreclaimable",
    ] {
        if let Some(value) = vmstat.get(key) {
            snapshot.set_gauge(key, value);
        }
    }
    snapshot
}

/// Step-weighted score: each component adds its weight once its input
/// crosses the configured level.
pub fn pressure_score(metrics: &NumaMetrics, weights: &PressureWeights) -> f64 {
    let mut score = 0.0;
    if metrics.dirty_pages > weights.dirty_pages {
        score += weights.dirty_weight;
    }
    if metrics.writeback_pages > weights.writeback_pages {
        score += weights.writeback_weight;
    }
    if metrics.scan_rate > weights.scan_per_sec {
        score += weights.scan_weight;
    }
    if metrics.major_fault_rate > weights.major_faults_per_sec {
        score += weights.major_fault_weight;
    }
    if metrics.is_swapping() {
        score += weights.swap_weight;
    }
    score
}

pub fn node_metrics(node: &NodeInfo) -> NodeMetrics {
    let used_kb = node.mem_total_kb.saturating_sub(node.mem_free_kb);
    NodeMetrics {
        id: node.id,
        total_kb: node.mem_total_kb,
        free_kb: node.mem_free_kb,
        used_kb,
        usage_percent: compute_percent(used_kb as f64, node.mem_total_kb as f64),
        cpus: node.cpus.clone(),
    }
}

pub fn numa_metrics(deltas: &Deltas, nodes: &[NodeInfo], weights: &PressureWeights) -> NumaMetrics {
    let rate = |name: &str| deltas.rate(name).unwrap_or(0.0);
    let gauge = |name: &str| deltas.gauge(name).unwrap_or(0);

    let nodes: Vec<NodeMetrics> = nodes.iter().map(node_metrics).collect();
    let imbalance_percent = (nodes.len() >= 2).then(|| {
        let (min, max) = nodes.iter().fold((f64::MAX, f64::MIN), |(min, max), node| {
            (min.min(node.usage_percent), max.max(node.usage_percent))
        });
        max - min
    });

    let mut metrics = NumaMetrics {
        page_fault_rate: rate("pgfault"),
        major_fault_rate: rate("pgmajfault"),
        page_in_rate: rate("pgpgin"),
        page_out_rate: rate("pgpgout"),
        swap_in_rate: rate("pswpin"),
        swap_out_rate: rate("pswpout"),
        swap_pages: deltas.total(&["pswpin", "pswpout"]).unwrap_or(0),
        scan_rate: rate("pgscan"),
        steal_rate: rate("pgsteal"),
        dirty_pages: gauge("nr_dirty"),
        writeback_pages: gauge("nr_writeback"),
        unstable_pages: gauge("nr_unstable"),
        slab_reclaimable_pages: gauge("nr_slab_reclaimable"),
        slab_unreclaimable_pages: gauge("nr_slab_unreclaimable"),
        pressure_score: 0.0,
        nodes,
        imbalance_percent,
    };
    metrics.pressure_score = pressure_score(&metrics, weights);
    metrics
}

fn read_numa_sample(procfs: &ProcFs) -> Result<NumaSample, SourceError> {
    let vmstat = procfs.read_vmstat()?;
    let nodes = procfs.read_numa_nodes().unwrap_or_else(|error| {
        debug!("no NUMA topology: {}", error);
        Vec::new()
    });
    Ok(NumaSample {
        vmstat: vmstat_snapshot(&vmstat, Instant::now()),
        nodes,
    })
}

pub fn collect_numa_sample(
    procfs: &ProcFs,
    weights: &PressureWeights,
    state: &mut SourceState<NumaSample>,
    valid_for: Duration,
) -> SampleEnvelope<NumaMetrics> {
    let started = Instant::now();
    let reading = read_numa_sample(procfs);

    state.collect(started, valid_for, reading, |ring| {
        let Some(current) = ring.current() else {
            return Metrics::Unavailable(Unavailable::FirstSample);
        };
        DeltaEngine::diff(ring.previous().map(|sample| &sample.vmstat), &current.vmstat)
            .map(|deltas| numa_metrics(&deltas, &current.nodes, weights))
    })
}

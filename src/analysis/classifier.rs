use std::cmp::Ordering;

use crate::config::Thresholds;
use crate::metrics::{
    CpuMetrics, MemoryMetrics, NumaMetrics, PerfMetrics, ProcessesMetrics, StorageMetrics,
};

use super::flags::{BottleneckFlag, FlagKind, FlagSet};

/// The computed metrics of one tick. A `None` domain was unavailable and
/// contributes no flags.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsRecord<'a> {
    pub cpu: Option<&'a CpuMetrics>,
    pub perf: Option<&'a PerfMetrics>,
    pub memory: Option<&'a MemoryMetrics>,
    pub storage: Option<&'a StorageMetrics>,
    pub numa: Option<&'a NumaMetrics>,
    pub processes: Option<&'a ProcessesMetrics>,
}

/// Fixed-threshold rules over one tick's metrics. No state is carried
/// between calls.
#[derive(Clone, Debug)]
pub struct BottleneckClassifier {
    thresholds: Thresholds,
}

impl BottleneckClassifier {
    pub fn new(thresholds: &Thresholds) -> Self {
        BottleneckClassifier {
            thresholds: thresholds.clone(),
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn classify(&self, record: &MetricsRecord<'_>) -> FlagSet {
        let mut flags = FlagSet::new();
        if let Some(cpu) = record.cpu {
            self.classify_cpu(cpu, &mut flags);
        }
        if let Some(perf) = record.perf {
            self.classify_perf(perf, &mut flags);
        }
        if let Some(memory) = record.memory {
            self.classify_memory(memory, &mut flags);
        }
        if let Some(storage) = record.storage {
            self.classify_storage(storage, &mut flags);
        }
        if let Some(numa) = record.numa {
            self.classify_numa(numa, &mut flags);
        }
        if let Some(processes) = record.processes {
            self.classify_processes(processes, &mut flags);
        }
        flags
    }

    fn classify_cpu(&self, cpu: &CpuMetrics, flags: &mut FlagSet) {
        let limits = &self.thresholds.cpu;
        if cpu.total_ticks == 0 {
            return;
        }
        if cpu.usage > limits.saturated_usage_percent {
            flags.push(BottleneckFlag::new(FlagKind::CpuSaturated, cpu.usage));
        }
        if cpu.iowait > limits.iowait_percent {
            flags.push(BottleneckFlag::new(FlagKind::IowaitHigh, cpu.iowait));
        }
    }

    /// A ratio whose denominator did not move this tick is insufficient data,
    /// not a bottleneck.
    fn classify_perf(&self, perf: &PerfMetrics, flags: &mut FlagSet) {
        let limits = &self.thresholds.perf;
        let moved = |delta: Option<u64>| delta.is_some_and(|delta| delta > 0);

        if let Some(hit_rate) = perf.cache_hit_rate.filter(|_| moved(perf.cache_references)) {
            if hit_rate < limits.min_cache_hit_rate {
                flags.push(BottleneckFlag::new(FlagKind::CacheThrashing, hit_rate));
            }
        }
        if let Some(miss_rate) = perf
            .branch_miss_rate
            .filter(|_| moved(perf.branch_instructions))
        {
            if miss_rate > limits.max_branch_miss_rate {
                flags.push(BottleneckFlag::new(FlagKind::BranchMispredicting, miss_rate));
            }
        }
        if let Some(ipc) = perf.ipc.filter(|_| moved(perf.cycles)) {
            if ipc < limits.min_ipc {
                flags.push(BottleneckFlag::new(FlagKind::CpuBound, ipc));
            }
        }
    }

    fn classify_memory(&self, memory: &MemoryMetrics, flags: &mut FlagSet) {
        let limits = &self.thresholds.memory;
        if memory.total_kb == 0 {
            return;
        }
        let pressure = memory.available_percent < limits.min_available_percent;
        if pressure {
            flags.push(BottleneckFlag::new(
                FlagKind::MemoryPressure,
                memory.available_percent,
            ));
        }
        if memory.dirty_percent > limits.max_dirty_percent {
            flags.push(BottleneckFlag::new(
                FlagKind::WriteBottleneck,
                memory.dirty_percent,
            ));
        }
        if memory.usage_percent > limits.exhausted_usage_percent {
            flags.push(BottleneckFlag::new(
                FlagKind::MemoryExhausted,
                memory.usage_percent,
            ));
        }
        if memory.dirty_percent > limits.backlog_dirty_percent
            || memory.writeback_percent > limits.backlog_writeback_percent
            || (pressure && memory.cache_percent < limits.backlog_min_cache_percent)
        {
            flags.push(BottleneckFlag::new(
                FlagKind::DirtyBacklog,
                memory.dirty_percent + memory.writeback_percent,
            ));
        }
    }

    /// Idle devices are never hot or queue-bound.
    fn classify_storage(&self, storage: &StorageMetrics, flags: &mut FlagSet) {
        let limits = &self.thresholds.storage;
        let mut busy: Vec<_> = storage
            .devices
            .iter()
            .filter(|device| device.completed_ios > 0)
            .collect();

        if !busy.is_empty() && limits.hot_fraction > 0.0 {
            busy.sort_by(|a, b| {
                b.total_iops
                    .partial_cmp(&a.total_iops)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.device.cmp(&b.device))
            });
            let hot = ((busy.len() as f64 * limits.hot_fraction).floor() as usize).max(1);
            for device in busy.iter().take(hot) {
                flags.push(BottleneckFlag::on(
                    FlagKind::HotDevice,
                    device.device.clone(),
                    device.total_iops,
                ));
            }
        }

        for device in &busy {
            let capacity = if device.queue_capacity > 0 {
                device.queue_capacity
            } else {
                limits.max_queue_depth
            };
            if device.queue_depth > capacity {
                flags.push(BottleneckFlag::on(
                    FlagKind::QueueBottleneck,
                    device.device.clone(),
                    device.queue_depth as f64,
                ));
            }
        }
    }

    fn classify_numa(&self, numa: &NumaMetrics, flags: &mut FlagSet) {
        let limits = &self.thresholds.numa;
        if numa.pressure_score > limits.pressured_score {
            flags.push(BottleneckFlag::new(
                FlagKind::MemoryPressured,
                numa.pressure_score,
            ));
        }
        if numa.is_swapping() {
            flags.push(BottleneckFlag::new(
                FlagKind::Swapping,
                numa.swap_pages as f64,
            ));
        }
        if let Some(imbalance) = numa.imbalance_percent {
            if imbalance > limits.imbalance_percent {
                flags.push(BottleneckFlag::new(FlagKind::NumaImbalance, imbalance));
            }
        }
    }

    fn classify_processes(&self, processes: &ProcessesMetrics, flags: &mut FlagSet) {
        let limits = &self.thresholds.process;
        for process in &processes.processes {
            let subject = format!("{} ({})", process.pid, process.comm);
            let mut flag =
                |kind, value| flags.push(BottleneckFlag::on(kind, subject.clone(), value));

            if process.cpu_percent > limits.cpu_percent {
                flag(FlagKind::CpuIntensive, process.cpu_percent);
            }
            if process.rss_mb > limits.rss_mb {
                flag(FlagKind::MemoryIntensive, process.rss_mb);
            }
            if let Some(bytes) = process.bytes_per_read_syscall {
                if bytes > limits.bytes_per_syscall {
                    flag(FlagKind::IoIntensive, bytes);
                }
            }
            if process.context_switch_rate > limits.context_switches_per_sec {
                flag(FlagKind::ContextSwitchHeavy, process.context_switch_rate);
            }
            if process.page_fault_rate > limits.page_faults_per_sec {
                flag(FlagKind::PageFaultHeavy, process.page_fault_rate);
            }
        }
    }
}

mod cpu;
mod delta;
mod interrupts;
mod memory;
mod numa;
mod perf;
mod process;
mod ring;
mod source;
mod storage;
#[cfg(test)]
mod tests;
mod types;

pub use cpu::{collect_cpu_sample, cpu_metrics, cpu_snapshot, CpuMetrics, CPU_BUCKETS};
pub use delta::{compute_percent, compute_rate, counter_delta, ratio, DeltaEngine, Deltas};
pub use interrupts::{
    collect_interrupt_sample, describe_interrupt, interrupt_table, InterruptMetrics, InterruptRate,
    InterruptTable,
};
pub use memory::{collect_memory_sample, memory_metrics, memory_snapshot, MemoryMetrics};
pub use numa::{
    collect_numa_sample, node_metrics, numa_metrics, pressure_score, vmstat_snapshot, NodeMetrics,
    NumaMetrics, NumaSample,
};
pub use perf::{
    branch_miss_rate, cache_hit_rate, ipc, perf_metrics, PerfMetrics, BRANCH_INSTRUCTIONS,
    BRANCH_MISSES, CACHE_MISSES, CACHE_REFERENCES, CONTEXT_SWITCHES, CYCLES, INSTRUCTIONS,
    PAGE_FAULTS,
};
pub use process::{
    collect_process_sample, process_metrics, process_table, processes_metrics, ProcessLabel,
    ProcessMetrics, ProcessTable, ProcessUnits, ProcessesMetrics,
};
pub use ring::SnapshotRing;
pub use source::SourceState;
pub use storage::{
    collect_storage_sample, device_metrics, storage_snapshot, DeviceMetrics, StorageMetrics,
    SECTOR_BYTES,
};
pub use types::{KeyedSnapshots, Metrics, SampleEnvelope, Snapshot, Unavailable};

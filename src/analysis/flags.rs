use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Cpu,
    Perf,
    Memory,
    Storage,
    Numa,
    Process,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagKind {
    CpuSaturated,
    IowaitHigh,
    CacheThrashing,
    BranchMispredicting,
    CpuBound,
    MemoryPressure,
    WriteBottleneck,
    MemoryExhausted,
    DirtyBacklog,
    HotDevice,
    QueueBottleneck,
    MemoryPressured,
    Swapping,
    NumaImbalance,
    CpuIntensive,
    MemoryIntensive,
    IoIntensive,
    ContextSwitchHeavy,
    PageFaultHeavy,
}

impl FlagKind {
    pub fn domain(self) -> Domain {
        use FlagKind::*;
        match self {
            CpuSaturated | IowaitHigh => Domain::Cpu,
            CacheThrashing | BranchMispredicting | CpuBound => Domain::Perf,
            MemoryPressure | WriteBottleneck | MemoryExhausted | DirtyBacklog => Domain::Memory,
            HotDevice | QueueBottleneck => Domain::Storage,
            MemoryPressured | Swapping | NumaImbalance => Domain::Numa,
            CpuIntensive | MemoryIntensive | IoIntensive | ContextSwitchHeavy | PageFaultHeavy => {
                Domain::Process
            }
        }
    }

    pub fn label(self) -> &'static str {
        use FlagKind::*;
        match self {
            CpuSaturated => "cpu-saturated",
            IowaitHigh => "iowait-high",
            CacheThrashing => "cache-thrashing",
            BranchMispredicting => "branch-mispredicting",
            CpuBound => "cpu-bound",
            MemoryPressure => "memory-pressure",
            WriteBottleneck => "write-bottleneck",
            MemoryExhausted => "memory-exhausted",
            DirtyBacklog => "dirty-backlog",
            HotDevice => "hot-device",
            QueueBottleneck => "queue-bottleneck",
            MemoryPressured => "memory-pressured",
            Swapping => "swapping",
            NumaImbalance => "numa-imbalance",
            CpuIntensive => "cpu-intensive",
            MemoryIntensive => "memory-intensive",
            IoIntensive => "io-intensive",
            ContextSwitchHeavy => "context-switch-heavy",
            PageFaultHeavy => "page-fault-heavy",
        }
    }

    /// Explanation and advice used when the flag is reported on its own.
    pub fn explain(self) -> (&'static str, &'static str) {
        use FlagKind::*;
        match self {
            CpuSaturated => (
                "CPU overloaded",
                "find the busiest processes and spread or cut their work",
            ),
            IowaitHigh => ("CPU time lost waiting on I/O", "check storage latency and queue depth"),
            CacheThrashing => (
                "low cache hit rate, memory bandwidth bound",
                "improve data locality or shrink the working set",
            ),
            BranchMispredicting => (
                "frequent branch mispredictions stall the pipeline",
                "make hot branches more predictable",
            ),
            CpuBound => ("few instructions retired per cycle", "profile for stalls in hot code"),
            MemoryPressure => ("little memory available", "free memory or add capacity"),
            WriteBottleneck => ("dirty pages piling up", "tune dirty ratios or reduce write load"),
            MemoryExhausted => ("memory nearly exhausted", "free memory or add capacity"),
            DirtyBacklog => (
                "page cache writeback is backing up toward storage",
                "tune dirty page ratios and optimise write patterns",
            ),
            HotDevice => ("storage load concentrated on few devices", "spread I/O across devices"),
            QueueBottleneck => (
                "device queue over capacity",
                "reduce outstanding I/O or add devices",
            ),
            MemoryPressured => (
                "VM reclaim under pressure",
                "reduce memory usage or add physical memory",
            ),
            Swapping => ("pages are being swapped", "add memory or reduce the resident set"),
            NumaImbalance => (
                "NUMA nodes unevenly loaded",
                "bind processes to nodes with numactl",
            ),
            CpuIntensive => ("processes using a large CPU share", "review the listed processes"),
            MemoryIntensive => (
                "processes with a large resident set",
                "review the listed processes",
            ),
            IoIntensive => ("processes issuing large storage reads", "review the listed processes"),
            ContextSwitchHeavy => (
                "processes switching context very often",
                "reduce thread counts or lock contention",
            ),
            PageFaultHeavy => ("processes faulting pages rapidly", "check for memory churn"),
        }
    }
}

/// A condition that held this tick, with the metric value that tripped it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BottleneckFlag {
    pub domain: Domain,
    pub kind: FlagKind,
    /// Device, process or node the flag is about; `None` for system-wide flags.
    pub subject: Option<String>,
    pub value: f64,
}

impl BottleneckFlag {
    pub fn new(kind: FlagKind, value: f64) -> Self {
        BottleneckFlag {
            domain: kind.domain(),
            kind,
            subject: None,
            value,
        }
    }

    pub fn on(kind: FlagKind, subject: impl Into<String>, value: f64) -> Self {
        BottleneckFlag {
            subject: Some(subject.into()),
            ..BottleneckFlag::new(kind, value)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlagSet {
    flags: Vec<BottleneckFlag>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, flag: BottleneckFlag) {
        self.flags.push(flag);
    }

    pub fn contains(&self, kind: FlagKind) -> bool {
        self.flags.iter().any(|flag| flag.kind == kind)
    }

    pub fn count(&self, kind: FlagKind) -> usize {
        self.flags.iter().filter(|flag| flag.kind == kind).count()
    }

    pub fn of_kind(&self, kind: FlagKind) -> impl Iterator<Item = &BottleneckFlag> {
        self.flags.iter().filter(move |flag| flag.kind == kind)
    }

    pub fn in_domain(&self, domain: Domain) -> impl Iterator<Item = &BottleneckFlag> {
        self.flags.iter().filter(move |flag| flag.domain == domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BottleneckFlag> {
        self.flags.iter()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl FromIterator<BottleneckFlag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = BottleneckFlag>>(iter: I) -> Self {
        FlagSet {
            flags: iter.into_iter().collect(),
        }
    }
}

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::analysis::{Analysis, BottleneckClassifier, CorrelationAnalyzer, FlagSet, MetricsRecord};
use crate::config::{ConfigError, MonitorConfig};
use crate::metrics::{
    collect_cpu_sample, collect_interrupt_sample, collect_memory_sample, collect_numa_sample,
    collect_process_sample, collect_storage_sample, perf_metrics, CpuMetrics, DeltaEngine,
    InterruptMetrics, InterruptTable, KeyedSnapshots, MemoryMetrics, Metrics, NumaMetrics,
    NumaSample, PerfMetrics, ProcessTable, ProcessUnits, ProcessesMetrics, SampleEnvelope,
    Snapshot, SourceState, StorageMetrics, Unavailable,
};
use crate::perf::{PerfCounterSession, PerfError, PerfReading, SessionState};
use crate::procfs::ProcFs;

use super::host::HostInfo;

const PERF_SOURCE: &str = "perf_event_open";

/// Everything one tick produced: each domain's envelope, the flags raised
/// and the correlated findings.
#[derive(Clone, Debug, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub captured_at: DateTime<Utc>,
    pub host: HostInfo,
    pub cpu: SampleEnvelope<CpuMetrics>,
    pub interrupts: SampleEnvelope<InterruptMetrics>,
    pub memory: SampleEnvelope<MemoryMetrics>,
    pub storage: SampleEnvelope<StorageMetrics>,
    pub numa: SampleEnvelope<NumaMetrics>,
    pub processes: SampleEnvelope<ProcessesMetrics>,
    pub perf: SampleEnvelope<PerfMetrics>,
    pub perf_session: Option<SessionState>,
    pub flags: FlagSet,
    pub analysis: Analysis,
}

impl TickReport {
    /// The domains that produced values this tick.
    pub fn record(&self) -> MetricsRecord<'_> {
        MetricsRecord {
            cpu: self.cpu.ready(),
            perf: self.perf.ready(),
            memory: self.memory.ready(),
            storage: self.storage.ready(),
            numa: self.numa.ready(),
            processes: self.processes.ready(),
        }
    }
}

struct PerfSource {
    session: PerfCounterSession,
    state: SourceState<PerfReading>,
}

impl PerfSource {
    fn collect(&mut self, valid_for: Duration) -> SampleEnvelope<PerfMetrics> {
        let started = Instant::now();
        let unsupported = match self.session.state() {
            SessionState::Live { .. } => None,
            SessionState::Unsupported { reason } => Some(reason.clone()),
            SessionState::Uninitialized => Some("session not initialised".to_string()),
        };
        let reading = match unsupported {
            None => Ok(self.session.read()),
            Some(reason) => Err(PerfError::Unsupported(reason)),
        };

        self.state.collect(started, valid_for, reading, |ring| {
            let Some(current) = ring.current() else {
                return Metrics::Unavailable(Unavailable::FirstSample);
            };
            let unavailable = current
                .unavailable
                .iter()
                .map(|event| event.name().to_string())
                .collect();
            DeltaEngine::diff(ring.previous().map(|reading| &reading.snapshot), &current.snapshot)
                .map(|deltas| perf_metrics(&deltas, unavailable))
        })
    }
}

/// Owns every per-domain source and runs one sampling pass per
/// [`tick`](Self::tick). Ticks are sequential; nothing here is shared.
pub struct Monitor {
    config: MonitorConfig,
    procfs: ProcFs,
    device_pattern: Regex,
    units: ProcessUnits,
    host: HostInfo,
    classifier: BottleneckClassifier,
    analyzer: CorrelationAnalyzer,
    cpu: SourceState<Snapshot>,
    interrupts: SourceState<InterruptTable>,
    memory: SourceState<Snapshot>,
    storage: SourceState<KeyedSnapshots<String>>,
    numa: SourceState<NumaSample>,
    processes: SourceState<ProcessTable>,
    perf: Option<PerfSource>,
    ticks: u64,
}

impl Monitor {
    /// Validates `config` and, when perf is enabled, opens the kernel
    /// counters. A perf session that cannot count is kept and reported as
    /// unsupported rather than failing construction.
    pub fn new(config: MonitorConfig) -> Result<Self, ConfigError> {
        let session = config
            .enable_perf
            .then(|| PerfCounterSession::new(config.perf_scope, config.perf_cpu));
        Self::with_parts(config, session, HostInfo::detect())
    }

    /// Uses `session` instead of opening kernel counters. `None` disables
    /// the perf domain regardless of `enable_perf`.
    pub fn with_parts(
        config: MonitorConfig,
        session: Option<PerfCounterSession>,
        host: HostInfo,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let device_pattern = config.device_regex()?;
        let perf = session.map(|mut session| {
            session.initialize();
            PerfSource {
                session,
                state: SourceState::new(PERF_SOURCE),
            }
        });

        Ok(Monitor {
            procfs: ProcFs::new(&config.proc_root, &config.sys_root),
            device_pattern,
            units: ProcessUnits::from_system(),
            host,
            classifier: BottleneckClassifier::new(&config.thresholds),
            analyzer: CorrelationAnalyzer::new(&config.thresholds),
            cpu: SourceState::new("/proc/stat"),
            interrupts: SourceState::new("/proc/interrupts"),
            memory: SourceState::new("/proc/meminfo"),
            storage: SourceState::new("/proc/diskstats"),
            numa: SourceState::new("/proc/vmstat"),
            processes: SourceState::new("/proc/[pid]"),
            perf,
            ticks: 0,
            config,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn perf_state(&self) -> Option<&SessionState> {
        self.perf.as_ref().map(|perf| perf.session.state())
    }

    /// Samples every enabled domain once, then classifies and correlates.
    pub fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let valid_for = self.config.interval();
        self.ticks += 1;

        let cpu = collect_cpu_sample(&self.procfs, &mut self.cpu, valid_for);
        let interrupts = collect_interrupt_sample(
            &self.procfs,
            &self.config.interrupt_descriptions,
            self.config.interrupt_top_n,
            &mut self.interrupts,
            valid_for,
        );
        let memory = collect_memory_sample(&self.procfs, &mut self.memory, valid_for);
        let storage = collect_storage_sample(
            &self.procfs,
            &self.device_pattern,
            &self.config.thresholds.storage,
            &mut self.storage,
            valid_for,
        );
        let numa = if self.config.enable_numa {
            collect_numa_sample(
                &self.procfs,
                &self.config.thresholds.numa.pressure,
                &mut self.numa,
                valid_for,
            )
        } else {
            SampleEnvelope::disabled(Utc::now(), self.numa.source())
        };
        let processes = if self.config.enable_process {
            collect_process_sample(
                &self.procfs,
                self.units,
                self.config.process_top_n,
                &mut self.processes,
                valid_for,
            )
        } else {
            SampleEnvelope::disabled(Utc::now(), self.processes.source())
        };
        let perf = match self.perf.as_mut() {
            Some(perf) => perf.collect(valid_for),
            None => SampleEnvelope::disabled(Utc::now(), PERF_SOURCE),
        };

        let mut report = TickReport {
            tick: self.ticks,
            captured_at: Utc::now(),
            host: self.host.clone(),
            cpu,
            interrupts,
            memory,
            storage,
            numa,
            processes,
            perf,
            perf_session: self.perf_state().cloned(),
            flags: FlagSet::new(),
            analysis: Analysis::default(),
        };
        report.flags = self.classifier.classify(&report.record());
        report.analysis = self.analyzer.analyze(&report.flags);

        debug!(
            "tick {} took {:?}, {} flags",
            report.tick,
            started.elapsed(),
            report.flags.len()
        );
        report
    }
}

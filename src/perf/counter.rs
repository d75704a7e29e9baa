use std::fs::File;
use std::io::{self, Read};

use log::debug;
use serde::Serialize;

use crate::metrics;

use super::ffi;
use super::PerfError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    Hardware,
    Software,
}

impl CounterKind {
    fn type_id(self) -> u32 {
        match self {
            CounterKind::Hardware => ffi::PERF_TYPE_HARDWARE,
            CounterKind::Software => ffi::PERF_TYPE_SOFTWARE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerfEvent {
    CpuCycles,
    Instructions,
    CacheReferences,
    CacheMisses,
    BranchInstructions,
    BranchMisses,
    ContextSwitches,
    PageFaults,
}

impl PerfEvent {
    pub const ALL: [PerfEvent; 8] = [
        PerfEvent::CpuCycles,
        PerfEvent::Instructions,
        PerfEvent::CacheReferences,
        PerfEvent::CacheMisses,
        PerfEvent::BranchInstructions,
        PerfEvent::BranchMisses,
        PerfEvent::ContextSwitches,
        PerfEvent::PageFaults,
    ];

    /// Counter name used in snapshots.
    pub fn name(self) -> &'static str {
        match self {
            PerfEvent::CpuCycles => metrics::CYCLES,
            PerfEvent::Instructions => metrics::INSTRUCTIONS,
            PerfEvent::CacheReferences => metrics::CACHE_REFERENCES,
            PerfEvent::CacheMisses => metrics::CACHE_MISSES,
            PerfEvent::BranchInstructions => metrics::BRANCH_INSTRUCTIONS,
            PerfEvent::BranchMisses => metrics::BRANCH_MISSES,
            PerfEvent::ContextSwitches => metrics::CONTEXT_SWITCHES,
            PerfEvent::PageFaults => metrics::PAGE_FAULTS,
        }
    }

    pub fn kind(self) -> CounterKind {
        match self {
            PerfEvent::ContextSwitches | PerfEvent::PageFaults => CounterKind::Software,
            _ => CounterKind::Hardware,
        }
    }

    fn config(self) -> u64 {
        match self {
            PerfEvent::CpuCycles => ffi::PERF_COUNT_HW_CPU_CYCLES,
            PerfEvent::Instructions => ffi::PERF_COUNT_HW_INSTRUCTIONS,
            PerfEvent::CacheReferences => ffi::PERF_COUNT_HW_CACHE_REFERENCES,
            PerfEvent::CacheMisses => ffi::PERF_COUNT_HW_CACHE_MISSES,
            PerfEvent::BranchInstructions => ffi::PERF_COUNT_HW_BRANCH_INSTRUCTIONS,
            PerfEvent::BranchMisses => ffi::PERF_COUNT_HW_BRANCH_MISSES,
            PerfEvent::ContextSwitches => ffi::PERF_COUNT_SW_CONTEXT_SWITCHES,
            PerfEvent::PageFaults => ffi::PERF_COUNT_SW_PAGE_FAULTS,
        }
    }

    pub fn attr(self) -> ffi::PerfEventAttr {
        ffi::PerfEventAttr::counting(self.kind().type_id(), self.config())
    }
}

/// An opened counter the session can enable and read. Dropping it releases
/// the underlying descriptor.
pub trait CounterDevice: Send {
    fn enable(&mut self) -> io::Result<()>;
    /// Reads one record into `buf`, returning the bytes read.
    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens counters. Implemented by [`KernelOpener`] and by fakes in tests.
pub trait CounterOpener: Send {
    fn open(&mut self, event: PerfEvent, pid: i32, cpu: i32)
        -> Result<Box<dyn CounterDevice>, PerfError>;

    /// CPUs to open one handle on for whole-system counting.
    fn cpus(&self) -> Vec<i32>;
}

pub struct KernelCounter {
    file: File,
}

impl CounterDevice for KernelCounter {
    #[cfg(target_os = "linux")]
    fn enable(&mut self) -> io::Result<()> {
        ffi::enable(&self.file)
    }

    #[cfg(not(target_os = "linux"))]
    fn enable(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "perf events need Linux"))
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

#[derive(Debug, Default, Clone)]
pub struct KernelOpener;

impl CounterOpener for KernelOpener {
    #[cfg(target_os = "linux")]
    fn open(
        &mut self,
        event: PerfEvent,
        pid: i32,
        cpu: i32,
    ) -> Result<Box<dyn CounterDevice>, PerfError> {
        let fd = ffi::perf_event_open(&event.attr(), pid, cpu).map_err(|source| {
            PerfError::Open {
                event: event.name(),
                cpu,
                source,
            }
        })?;
        Ok(Box::new(KernelCounter {
            file: File::from(fd),
        }))
    }

    #[cfg(not(target_os = "linux"))]
    fn open(
        &mut self,
        _event: PerfEvent,
        _pid: i32,
        _cpu: i32,
    ) -> Result<Box<dyn CounterDevice>, PerfError> {
        Err(PerfError::Unsupported(
            "perf_event_open is Linux-only".to_string(),
        ))
    }

    fn cpus(&self) -> Vec<i32> {
        let online = std::fs::read_to_string("/sys/devices/system/cpu/online")
            .map(|text| crate::procfs::parse_cpulist(&text))
            .unwrap_or_default();
        if online.is_empty() {
            (0..num_cpus::get() as i32).collect()
        } else {
            online.into_iter().map(|cpu| cpu as i32).collect()
        }
    }
}

/// One open counter, owned by a [`super::PerfCounterSession`].
pub struct PerfCounterHandle {
    device: Box<dyn CounterDevice>,
    event: PerfEvent,
    cpu: i32,
    enabled: bool,
}

impl PerfCounterHandle {
    pub fn new(device: Box<dyn CounterDevice>, event: PerfEvent, cpu: i32) -> Self {
        PerfCounterHandle {
            device,
            event,
            cpu,
            enabled: false,
        }
    }

    pub fn event(&self) -> PerfEvent {
        self.event
    }

    pub fn kind(&self) -> CounterKind {
        self.event.kind()
    }

    pub fn cpu(&self) -> i32 {
        self.cpu
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) -> Result<(), PerfError> {
        self.device.enable().map_err(|source| PerfError::Enable {
            event: self.event.name(),
            source,
        })?;
        self.enabled = true;
        Ok(())
    }

    /// The running count, scaled for multiplexing. `None` for a failed or
    /// short read, or a counter that has not been scheduled yet.
    pub fn read(&mut self) -> Option<u64> {
        let mut buf = [0u8; ffi::READ_RECORD_BYTES];
        let read = match self.device.read_raw(&mut buf) {
            Ok(read) => read,
            Err(error) => {
                debug!("{} on cpu {}: read failed: {}", self.event.name(), self.cpu, error);
                return None;
            }
        };
        let Some((value, enabled, running)) = ffi::decode_record(&buf[..read]) else {
            debug!(
                "{} on cpu {}: short read of {} bytes",
                self.event.name(),
                self.cpu,
                read
            );
            return None;
        };
        ffi::scale_count(value, enabled, running)
    }
}

//! Readers for the kernel pseudo-files the monitor samples.
//!
//! Every reader is split into a pure `parse_*` function over the file text and
//! a thin [`ProcFs`] method that resolves the path under a configurable root,
//! so fixture trees can stand in for `/proc` and `/sys`. Malformed lines are
//! skipped; a file that cannot be read at all is a [`SourceError`].

mod cpu;
mod diskstats;
mod interrupts;
mod memory;
mod numa;
mod process;
mod vmstat;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use cpu::{parse_proc_stat, CpuTimes};
pub use diskstats::{parse_diskstats, parse_scheduler, DiskStats};
pub use interrupts::{parse_interrupts, InterruptLine};
pub use memory::{parse_meminfo, MemInfo};
pub use numa::{parse_cpulist, parse_node_meminfo, NodeInfo};
pub use process::{parse_pid_io, parse_pid_stat, parse_pid_status, ProcessIo, ProcessSample};
pub use vmstat::{parse_vmstat, VmStat};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: missing {field}", path.display())]
    Missing { path: PathBuf, field: &'static str },
}

#[derive(Debug, Clone)]
pub struct ProcFs {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        ProcFs::new("/proc", "/sys")
    }
}

impl ProcFs {
    pub fn new(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        ProcFs {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    pub fn sys_root(&self) -> &Path {
        &self.sys_root
    }

    fn proc_path(&self, relative: &str) -> PathBuf {
        self.proc_root.join(relative)
    }

    fn sys_path(&self, relative: &str) -> PathBuf {
        self.sys_root.join(relative)
    }
}

pub(crate) fn read_file(path: &Path) -> Result<String, SourceError> {
    fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses the value after a `Key:` prefix, ignoring a trailing unit.
pub(crate) fn parse_keyed_value(line: &str) -> Option<(&str, u64)> {
    let (key, rest) = line.split_once(':')?;
    let value = rest.split_whitespace().next()?.parse().ok()?;
    Some((key.trim(), value))
}

pub fn clock_ticks_per_sec() -> u64 {
    let raw = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if raw > 0 {
        raw as u64
    } else {
        100
    }
}

pub fn page_size() -> u64 {
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 {
        raw as u64
    } else {
        4096
    }
}

use log::debug;
use serde::Serialize;

use super::{read_file, ProcFs, SourceError};

/// Aggregate CPU time buckets from the `cpu` line of `/proc/stat`, in clock
/// ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    pub fn buckets(&self) -> [(&'static str, u64); 10] {
        [
            ("user", self.user),
            ("nice", self.nice),
            ("system", self.system),
            ("idle", self.idle),
            ("iowait", self.iowait),
            ("irq", self.irq),
            ("softirq", self.softirq),
            ("steal", self.steal),
            ("guest", self.guest),
            ("guest_nice", self.guest_nice),
        ]
    }
}

/// Returns `None` when no aggregate `cpu` line is present. Columns missing on
/// older kernels read as zero; a column that does not parse rejects the whole
/// line rather than reading as zero.
pub fn parse_proc_stat(text: &str) -> Option<CpuTimes> {
    let line = text
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))?;

    let mut values = [0u64; 10];
    for (slot, field) in values
        .iter_mut()
        .zip(line.split_whitespace().skip(1))
    {
        match field.parse() {
            Ok(value) => *slot = value,
            Err(_) => {
                debug!("rejecting /proc/stat cpu line with malformed field {:?}", field);
                return None;
            }
        }
    }

    let [user, nice, system, idle, iowait, irq, softirq, steal, guest, guest_nice] = values;
    Some(CpuTimes {
        user,
        nice,
        system,
        idle,
        iowait,
        irq,
        softirq,
        steal,
        guest,
        guest_nice,
    })
}

impl ProcFs {
    pub fn read_cpu_times(&self) -> Result<CpuTimes, SourceError> {
        let path = self.proc_path("stat");
        let text = read_file(&path)?;
        parse_proc_stat(&text).ok_or(SourceError::Missing {
            path,
            field: "well-formed aggregate cpu line",
        })
    }
}

use serde::Serialize;

use super::{parse_keyed_value, read_file, ProcFs, SourceError};

/// Selected `/proc/meminfo` fields, in kB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemInfo {
    pub total: u64,
    pub free: u64,
    pub available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_cached: u64,
    pub active: u64,
    pub inactive: u64,
    pub dirty: u64,
    pub writeback: u64,
}

/// Returns `None` when `MemTotal` is absent; any other missing key reads as 0.
pub fn parse_meminfo(text: &str) -> Option<MemInfo> {
    let mut info = MemInfo::default();
    let mut saw_total = false;
    for (key, value) in text.lines().filter_map(parse_keyed_value) {
        match key {
            "MemTotal" => {
                info.total = value;
                saw_total = true;
            }
            "MemFree" => info.free = value,
            "MemAvailable" => info.available = value,
            "Buffers" => info.buffers = value,
            "Cached" => info.cached = value,
            "SwapCached" => info.swap_cached = value,
            "Active" => info.active = value,
            "Inactive" => info.inactive = value,
            "Dirty" => info.dirty = value,
            "Writeback" => info.writeback = value,
            _ => {}
        }
    }
    saw_total.then_some(info)
}

impl ProcFs {
    pub fn read_meminfo(&self) -> Result<MemInfo, SourceError> {
        let path = self.proc_path("meminfo");
        let text = read_file(&path)?;
        parse_meminfo(&text).ok_or(SourceError::Missing {
            path,
            field: "MemTotal",
        })
    }
}

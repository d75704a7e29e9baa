use std::collections::BTreeMap;

use log::debug;

use super::{read_file, ProcFs, SourceError};

/// `/proc/vmstat` as a name to value map; the key set varies by kernel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VmStat {
    values: BTreeMap<String, u64>,
}

impl VmStat {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.values.get(key).copied()
    }

    /// Sum of whichever of `keys` are present, or `None` if none is.
    pub fn sum_of(&self, keys: &[&str]) -> Option<u64> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .reduce(|total, value| total.saturating_add(value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn parse_vmstat(text: &str) -> VmStat {
    let mut values = BTreeMap::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next().and_then(|v| v.parse::<u64>().ok())) {
            (Some(key), Some(value)) => {
                values.insert(key.to_string(), value);
            }
            _ if line.trim().is_empty() => {}
            _ => debug!("skipping malformed /proc/vmstat line {:?}", line),
        }
    }
    VmStat { values }
}

impl ProcFs {
    pub fn read_vmstat(&self) -> Result<VmStat, SourceError> {
        let path = self.proc_path("vmstat");
        let text = read_file(&path)?;
        let stats = parse_vmstat(&text);
        if stats.is_empty() {
            return Err(SourceError::Missing {
                path,
                field: "vmstat counters",
            });
        }
        Ok(stats)
    }
}

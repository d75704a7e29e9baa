use std::fs;

use log::debug;

use super::{read_file, ProcFs, SourceError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: u32,
    pub mem_total_kb: u64,
    pub mem_free_kb: u64,
    pub cpus: Vec<u32>,
}

/// Parses a kernel cpulist such as `0-3,8,10-11`.
pub fn parse_cpulist(text: &str) -> Vec<u32> {
    let mut cpus = Vec::new();
    for part in text.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => match (start.parse::<u32>(), end.parse::<u32>()) {
                (Ok(start), Ok(end)) if start <= end => cpus.extend(start..=end),
                _ => debug!("skipping malformed cpulist range {:?}", part),
            },
            None => match part.parse() {
                Ok(cpu) => cpus.push(cpu),
                Err(_) => debug!("skipping malformed cpulist entry {:?}", part),
            },
        }
    }
    cpus
}

/// Extracts `(MemTotal, MemFree)` from a per-node meminfo, whose lines read
/// `Node 0 MemTotal:  16318404 kB`.
pub fn parse_node_meminfo(text: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut free = None;
    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 || tokens[0] != "Node" {
            continue;
        }
        let Ok(value) = tokens[3].parse::<u64>() else {
            continue;
        };
        match tokens[2] {
            "MemTotal:" => total = Some(value),
            "MemFree:" => free = Some(value),
            _ => {}
        }
    }
    Some((total?, free.unwrap_or(0)))
}

impl ProcFs {
    /// Enumerates `node<N>` directories under `<sys>/devices/system/node`.
    pub fn read_numa_nodes(&self) -> Result<Vec<NodeInfo>, SourceError> {
        let dir = self.sys_path("devices/system/node");
        let entries = fs::read_dir(&dir).map_err(|source| SourceError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut nodes = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix("node"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            let node_dir = entry.path();
            let Some((mem_total_kb, mem_free_kb)) = read_file(&node_dir.join("meminfo"))
                .ok()
                .and_then(|text| parse_node_meminfo(&text))
            else {
                debug!("skipping NUMA node {} without meminfo", id);
                continue;
            };
            let cpus = read_file(&node_dir.join("cpulist"))
                .map(|text| parse_cpulist(&text))
                .unwrap_or_default();

            nodes.push(NodeInfo {
                id,
                mem_total_kb,
                mem_free_kb,
                cpus,
            });
        }

        if nodes.is_empty() {
            return Err(SourceError::Missing {
                path: dir,
                field: "NUMA nodes",
            });
        }
        nodes.sort_by_key(|node| node.id);
        Ok(nodes)
    }
}

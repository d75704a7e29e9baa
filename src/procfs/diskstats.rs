use std::path::PathBuf;

use log::debug;
use regex::Regex;

use super::{read_file, ProcFs, SourceError};

/// One `/proc/diskstats` row. Times are in milliseconds, sectors are 512 bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiskStats {
    pub device: String,
    pub reads_completed: u64,
    pub reads_merged: u64,
    pub sectors_read: u64,
    pub read_time_ms: u64,
    pub writes_completed: u64,
    pub writes_merged: u64,
    pub sectors_written: u64,
    pub write_time_ms: u64,
    pub io_in_progress: u64,
    pub io_time_ms: u64,
    pub weighted_io_time_ms: u64,
}

pub fn parse_diskstats(text: &str) -> Vec<DiskStats> {
    let mut devices = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 {
            if !fields.is_empty() {
                debug!("skipping short /proc/diskstats line {:?}", line);
            }
            continue;
        }

        let mut values = [0u64; 11];
        let mut malformed = false;
        for (slot, field) in values.iter_mut().zip(&fields[3..14]) {
            match field.parse() {
                Ok(value) => *slot = value,
                Err(_) => {
                    malformed = true;
                    break;
                }
            }
        }
        if malformed {
            debug!("skipping malformed /proc/diskstats line {:?}", line);
            continue;
        }

        let [
            reads_completed,
            reads_merged,
            sectors_read,
            read_time_ms,
            writes_completed,
            writes_merged,
            sectors_written,
            write_time_ms,
            io_in_progress,
            io_time_ms,
            weighted_io_time_ms,
        ] = values;
        devices.push(DiskStats {
            device: fields[2].to_string(),
            reads_completed,
            reads_merged,
            sectors_read,
            read_time_ms,
            writes_completed,
            writes_merged,
            sectors_written,
            write_time_ms,
            io_in_progress,
            io_time_ms,
            weighted_io_time_ms,
        });
    }
    devices
}

/// Picks the bracketed entry out of a `queue/scheduler` listing such as
/// `mq-deadline kyber [none]`.
pub fn parse_scheduler(text: &str) -> Option<String> {
    text.split_whitespace()
        .find_map(|entry| entry.strip_prefix('[')?.strip_suffix(']'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

impl ProcFs {
    /// Reads diskstats rows whose device name matches `pattern`. When
    /// `<sys>/block` is listable, devices absent from it (partitions) are
    /// dropped as well.
    pub fn read_diskstats(&self, pattern: &Regex) -> Result<Vec<DiskStats>, SourceError> {
        let path = self.proc_path("diskstats");
        let text = read_file(&path)?;
        let block_dir = self.sys_path("block");
        let listed = block_dir.is_dir();

        Ok(parse_diskstats(&text)
            .into_iter()
            .filter(|stats| pattern.is_match(&stats.device))
            .filter(|stats| !listed || block_dir.join(&stats.device).exists())
            .collect())
    }

    /// Requests `device` can have in flight: the hardware queue depth from
    /// `device/queue_depth` where the driver exposes one, else the block
    /// layer's `queue/nr_requests` pool.
    pub fn read_queue_capacity(&self, device: &str) -> Option<u64> {
        let block = self.sys_path("block").join(device);
        let read_count = |path: PathBuf| -> Option<u64> {
            let text = read_file(&path).ok()?;
            text.trim().parse().ok().filter(|count| *count > 0)
        };
        read_count(block.join("device").join("queue_depth"))
            .or_else(|| read_count(block.join("queue").join("nr_requests")))
    }

    /// The active I/O scheduler for `device`, if the block layer exposes one.
    pub fn read_scheduler(&self, device: &str) -> Option<String> {
        let path = self
            .sys_path("block")
            .join(device)
            .join("queue")
            .join("scheduler");
        let text = read_file(&path).ok()?;
        parse_scheduler(&text)
    }
}

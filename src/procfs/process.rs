use std::fs;

use log::debug;

use super::{parse_keyed_value, read_file, ProcFs, SourceError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessIo {
    pub rchar: u64,
    pub wchar: u64,
    pub syscr: u64,
    pub syscw: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessSample {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub minflt: u64,
    pub majflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub num_threads: u64,
    pub vsize_bytes: u64,
    pub rss_pages: u64,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
    /// `None` when `/proc/<pid>/io` is unreadable, usually for lack of
    /// privilege.
    pub io: Option<ProcessIo>,
}

/// Parses `/proc/<pid>/stat`. The command name may itself contain spaces and
/// parentheses, so fields are counted from the last `)`.
pub fn parse_pid_stat(pid: u32, text: &str) -> Option<ProcessSample> {
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close < open {
        return None;
    }
    let comm = text[open + 1..close].to_string();
    let rest: Vec<&str> = text[close + 1..].split_whitespace().collect();
    // rest[0] is field 3 (state) of proc(5)
    let field = |n: usize| -> Option<u64> { rest.get(n - 3)?.parse().ok() };

    Some(ProcessSample {
        pid,
        comm,
        state: rest.first()?.chars().next()?,
        minflt: field(10)?,
        majflt: field(12)?,
        utime: field(14)?,
        stime: field(15)?,
        num_threads: field(20)?,
        vsize_bytes: field(23)?,
        rss_pages: field(24)?,
        ..ProcessSample::default()
    })
}

/// Returns `(voluntary, nonvoluntary)` context switch counts.
pub fn parse_pid_status(text: &str) -> (u64, u64) {
    let mut voluntary = 0;
    let mut nonvoluntary = 0;
    for (key, value) in text.lines().filter_map(parse_keyed_value) {
        match key {
            "voluntary_ctxt_switches" => voluntary = value,
            "nonvoluntary_ctxt_switches" => nonvoluntary = value,
            _ => {}
        }
    }
    (voluntary, nonvoluntary)
}

pub fn parse_pid_io(text: &str) -> ProcessIo {
    let mut io = ProcessIo::default();
    for (key, value) in text.lines().filter_map(parse_keyed_value) {
        match key {
            "rchar" => io.rchar = value,
            "wchar" => io.wchar = value,
            "syscr" => io.syscr = value,
            "syscw" => io.syscw = value,
            "read_bytes" => io.read_bytes = value,
            "write_bytes" => io.write_bytes = value,
            _ => {}
        }
    }
    io
}

impl ProcFs {
    /// Samples every numeric directory under the proc root. Processes that
    /// exit mid-scan are skipped.
    pub fn read_processes(&self) -> Result<Vec<ProcessSample>, SourceError> {
        let entries = fs::read_dir(&self.proc_root).map_err(|source| SourceError::Io {
            path: self.proc_root.clone(),
            source,
        })?;

        let mut samples = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            match self.read_process(pid) {
                Some(sample) => samples.push(sample),
                None => debug!("process {} vanished or unreadable", pid),
            }
        }
        samples.sort_by_key(|sample| sample.pid);
        Ok(samples)
    }

    pub fn read_process(&self, pid: u32) -> Option<ProcessSample> {
        let dir = self.proc_root.join(pid.to_string());
        let stat = read_file(&dir.join("stat")).ok()?;
        let mut sample = parse_pid_stat(pid, &stat)?;

        if let Ok(status) = read_file(&dir.join("status")) {
            let (voluntary, nonvoluntary) = parse_pid_status(&status);
            sample.voluntary_ctxt_switches = voluntary;
            sample.nonvoluntary_ctxt_switches = nonvoluntary;
        }
        sample.io = read_file(&dir.join("io")).ok().map(|text| parse_pid_io(&text));
        Some(sample)
    }
}

// src/config.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "SYSPROBE_CONFIG";
pub const MIN_INTERVAL_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerfScope {
    /// Every process on every online CPU, one counter per CPU summed together.
    System,
    /// The calling process and the children it spawns afterwards, any CPU.
    Process,
    /// Every process on a single CPU (`perf_cpu`).
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCapacitySource {
    Fixed,
    Device,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuThresholds {
    pub saturated_usage_percent: f64,
    pub iowait_percent: f64,
}

impl Default for CpuThresholds {
    fn default() -> Self {
        CpuThresholds {
            saturated_usage_percent: 90.0,
            iowait_percent: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfThresholds {
    pub min_cache_hit_rate: f64,
    pub max_branch_miss_rate: f64,
    pub min_ipc: f64,
}

impl Default for PerfThresholds {
    fn default() -> Self {
        PerfThresholds {
            min_cache_hit_rate: 80.0,
            max_branch_miss_rate: 5.0,
            min_ipc: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryThresholds {
    pub min_available_percent: f64,
    pub max_dirty_percent: f64,
    pub exhausted_usage_percent: f64,
    pub backlog_dirty_percent: f64,
    pub backlog_writeback_percent: f64,
    pub backlog_min_cache_percent: f64,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        MemoryThresholds {
            min_available_percent: 10.0,
            max_dirty_percent: 5.0,
            exhausted_usage_percent: 90.0,
            backlog_dirty_percent: 2.0,
            backlog_writeback_percent: 1.0,
            backlog_min_cache_percent: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageThresholds {
    pub max_queue_depth: u64,
    pub queue_capacity: QueueCapacitySource,
    /// Fraction of active devices (by IOPS) flagged hot each tick.
    pub hot_fraction: f64,
}

impl Default for StorageThresholds {
    fn default() -> Self {
        StorageThresholds {
            max_queue_depth: 128,
            queue_capacity: QueueCapacitySource::Device,
            hot_fraction: 0.25,
        }
    }
}

/// Weights for the vmstat pressure score. Each component contributes its
/// weight once its input crosses the threshold, so no component can exceed
/// its own weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureWeights {
    pub dirty_pages: u64,
    pub dirty_weight: f64,
    pub writeback_pages: u64,
    pub writeback_weight: f64,
    pub scan_per_sec: f64,
    pub scan_weight: f64,
    pub major_faults_per_sec: f64,
    pub major_fault_weight: f64,
    pub swap_weight: f64,
}

impl Default for PressureWeights {
    fn default() -> Self {
        PressureWeights {
            dirty_pages: 1000,
            dirty_weight: 20.0,
            writeback_pages: 500,
            writeback_weight: 15.0,
            scan_per_sec: 1000.0,
            scan_weight: 25.0,
            major_faults_per_sec: 10.0,
            major_fault_weight: 30.0,
            swap_weight: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumaThresholds {
    pub pressure: PressureWeights,
    pub pressured_score: f64,
    pub imbalance_percent: f64,
}

impl Default for NumaThresholds {
    fn default() -> Self {
        NumaThresholds {
            pressure: PressureWeights::default(),
            pressured_score: 50.0,
            imbalance_percent: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessThresholds {
    pub cpu_percent: f64,
    pub rss_mb: f64,
    pub bytes_per_syscall: f64,
    pub context_switches_per_sec: f64,
    pub page_faults_per_sec: f64,
    pub many_cpu_intensive: usize,
    pub many_memory_intensive: usize,
}

impl Default for ProcessThresholds {
    fn default() -> Self {
        ProcessThresholds {
            cpu_percent: 50.0,
            rss_mb: 1000.0,
            bytes_per_syscall: 1000.0,
            context_switches_per_sec: 1000.0,
            page_faults_per_sec: 100.0,
            many_cpu_intensive: 5,
            many_memory_intensive: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cpu: CpuThresholds,
    pub perf: PerfThresholds,
    pub memory: MemoryThresholds,
    pub storage: StorageThresholds,
    pub numa: NumaThresholds,
    pub process: ProcessThresholds,
}

impl Thresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let pressure = &self.numa.pressure;
        let values = [
            ("cpu.saturated_usage_percent", self.cpu.saturated_usage_percent),
            ("cpu.iowait_percent", self.cpu.iowait_percent),
            ("perf.min_cache_hit_rate", self.perf.min_cache_hit_rate),
            ("perf.max_branch_miss_rate", self.perf.max_branch_miss_rate),
            ("perf.min_ipc", self.perf.min_ipc),
            ("memory.min_available_percent", self.memory.min_available_percent),
            ("memory.max_dirty_percent", self.memory.max_dirty_percent),
            ("memory.exhausted_usage_percent", self.memory.exhausted_usage_percent),
            ("memory.backlog_dirty_percent", self.memory.backlog_dirty_percent),
            ("memory.backlog_writeback_percent", self.memory.backlog_writeback_percent),
            ("memory.backlog_min_cache_percent", self.memory.backlog_min_cache_percent),
            ("storage.hot_fraction", self.storage.hot_fraction),
            ("numa.pressure.dirty_weight", pressure.dirty_weight),
            ("numa.pressure.writeback_weight", pressure.writeback_weight),
            ("numa.pressure.scan_per_sec", pressure.scan_per_sec),
            ("numa.pressure.scan_weight", pressure.scan_weight),
            ("numa.pressure.major_faults_per_sec", pressure.major_faults_per_sec),
            ("numa.pressure.major_fault_weight", pressure.major_fault_weight),
            ("numa.pressure.swap_weight", pressure.swap_weight),
            ("numa.pressured_score", self.numa.pressured_score),
            ("numa.imbalance_percent", self.numa.imbalance_percent),
            ("process.cpu_percent", self.process.cpu_percent),
            ("process.rss_mb", self.process.rss_mb),
            ("process.bytes_per_syscall", self.process.bytes_per_syscall),
            ("process.context_switches_per_sec", self.process.context_switches_per_sec),
            ("process.page_faults_per_sec", self.process.page_faults_per_sec),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "threshold {} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.storage.hot_fraction > 1.0 {
            return Err(ConfigError::Invalid(
                "storage.hot_fraction must be within 0..=1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_ms: u64,
    pub enable_perf: bool,
    pub enable_numa: bool,
    pub enable_process: bool,
    pub perf_scope: PerfScope,
    pub perf_cpu: usize,
    pub process_top_n: usize,
    pub interrupt_top_n: usize,
    pub device_pattern: String,
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
    pub thresholds: Thresholds,
    pub interrupt_descriptions: BTreeMap<String, String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            interval_ms: 1000,
            enable_perf: false,
            enable_numa: false,
            enable_process: false,
            perf_scope: PerfScope::System,
            perf_cpu: 0,
            process_top_n: 10,
            interrupt_top_n: 5,
            device_pattern: r"^(nvme\d+n\d+|sd[a-z]+|vd[a-z]+|xvd[a-z]+|md\d+|gdg\w+|sxl\w+)$"
                .to_string(),
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            thresholds: Thresholds::default(),
            interrupt_descriptions: default_interrupt_descriptions(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn device_regex(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.device_pattern).map_err(|err| {
            ConfigError::Invalid(format!("device_pattern {:?}: {}", self.device_pattern, err))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms < MIN_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "interval_ms must be at least {}, got {}",
                MIN_INTERVAL_MS, self.interval_ms
            )));
        }
        self.device_regex()?;
        self.thresholds.validate()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MonitorConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path, then `$SYSPROBE_CONFIG`, then the per-user config file,
    /// then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }
        if let Some(path) = default_config_path() {
            if path.is_file() {
                return Self::from_file(&path);
            }
        }
        Ok(MonitorConfig::default())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push("sysprobe");
    path.push("config.json");
    Some(path)
}

fn default_interrupt_descriptions() -> BTreeMap<String, String> {
    [
        ("NMI", "Non-maskable interrupts"),
        ("LOC", "Local timer interrupts"),
        ("SPU", "Spurious interrupts"),
        ("PMI", "Performance monitoring interrupts"),
        ("IWI", "IRQ work interrupts"),
        ("RTR", "APIC ICR read retries"),
        ("RES", "Rescheduling interrupts"),
        ("CAL", "Function call interrupts"),
        ("TLB", "TLB shootdowns"),
        ("TRM", "Thermal event interrupts"),
        ("THR", "Threshold APIC interrupts"),
        ("DFR", "Deferred error APIC interrupts"),
        ("MCE", "Machine check exceptions"),
        ("MCP", "Machine check polls"),
        ("ERR", "Erroneous interrupts"),
        ("MIS", "Missed interrupts"),
        ("PIN", "Posted-interrupt notification events"),
        ("NPI", "Nested posted-interrupt events"),
        ("PIW", "Posted-interrupt wakeup events"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_validate() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.storage.max_queue_depth, 128);
        assert_eq!(config.interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "interval_ms": 2000, "thresholds": { "perf": { "min_ipc": 0.5 } } }"#,
        )
        .unwrap();

        let config = MonitorConfig::from_file(&path).unwrap();
        assert_eq!(config.interval_ms, 2000);
        assert_eq!(config.thresholds.perf.min_ipc, 0.5);
        assert_eq!(config.thresholds.perf.min_cache_hit_rate, 80.0);
        assert_eq!(config.thresholds.numa.pressured_score, 50.0);
    }

    #[test]
    fn rejects_short_interval_and_bad_regex() {
        let mut config = MonitorConfig {
            interval_ms: 10,
            ..MonitorConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.interval_ms = 1000;
        config.device_pattern = "(".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_negative_threshold() {
        let mut config = MonitorConfig::default();
        config.thresholds.perf.min_cache_hit_rate = -1.0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.thresholds.numa.pressure.swap_weight = -1000.0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.thresholds.process.page_faults_per_sec = -5.0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.thresholds.memory.backlog_dirty_percent = -1.0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.thresholds.numa.pressure.scan_per_sec = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = MonitorConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("explicit.json");
        fs::write(&path, r#"{ "enable_perf": true }"#).unwrap();

        let config = MonitorConfig::load(Some(&path)).unwrap();
        assert!(config.enable_perf);
    }
}

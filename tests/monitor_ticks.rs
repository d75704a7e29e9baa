use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sysprobe_lib::analysis::{FlagKind, HealthState};
use sysprobe_lib::config::{MonitorConfig, CONFIG_ENV_VAR};
use sysprobe_lib::monitor::{HostInfo, Monitor};
use tempfile::TempDir;

static TEST_ENV_GUARD: Mutex<()> = Mutex::new(());

struct ProcTree {
    _temp: TempDir,
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl ProcTree {
    fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let proc_root = temp.path().join("proc");
        let sys_root = temp.path().join("sys");
        fs::create_dir_all(proc_root.join("42")).expect("pid dir");
        fs::create_dir_all(sys_root.join("block/nvme0n1/queue")).expect("block dir");
        fs::write(sys_root.join("block/nvme0n1/queue/nr_requests"), "1023\n").expect("nr_requests");

        let tree = ProcTree {
            _temp: temp,
            proc_root,
            sys_root,
        };
        tree.write("stat", "cpu  1000 0 500 8000 100 0 0 0 0 0\n");
        tree.write(
            "meminfo",
            "MemTotal: 16000000 kB\nMemFree: 4000000 kB\nMemAvailable: 9000000 kB\n\
             Buffers: 100000 kB\nCached: 5000000 kB\n",
        );
        tree.write("interrupts", "           CPU0\nLOC:        100   Local timer interrupts\n");
        tree.write(
            "diskstats",
            " 259 0 nvme0n1 100 0 800 50 200 0 1600 80 0 120 130\n",
        );
        tree.vmstat(0, 0);
        tree.process(100, 1000);
        tree
    }

    fn write(&self, name: &str, contents: &str) {
        let path = self.proc_root.join(name);
        fs::write(path, contents).expect("write proc file");
    }

    fn vmstat(&self, pswpin: u64, pswpout: u64) {
        self.write(
            "vmstat",
            &format!(
                "nr_dirty 5\nnr_writeback 0\npgfault 5000\npgmajfault 2\npswpin {}\npswpout {}\n\
                 pgscan_kswapd 0\npgscan_direct 0\n",
                pswpin, pswpout
            ),
        );
    }

    fn process(&self, utime: u64, voluntary: u64) {
        self.write(
            "42/stat",
            &format!(
                "42 (worker) R 1 42 42 0 -1 0 10 0 0 0 {} 0 0 0 20 0 4 0 100 409600 100",
                utime
            ),
        );
        self.write(
            "42/status",
            &format!(
                "Name: worker\nvoluntary_ctxt_switches: {}\nnonvoluntary_ctxt_switches: 0\n",
                voluntary
            ),
        );
    }

    fn config(&self) -> MonitorConfig {
        MonitorConfig {
            interval_ms: 250,
            enable_numa: true,
            enable_process: true,
            proc_root: self.proc_root.clone(),
            sys_root: self.sys_root.clone(),
            ..MonitorConfig::default()
        }
    }

    fn monitor(&self) -> Monitor {
        Monitor::with_parts(self.config(), None, HostInfo::default()).expect("monitor")
    }
}

#[test]
fn quiet_system_never_reports_swapping() {
    let tree = ProcTree::new();
    let mut monitor = tree.monitor();
    monitor.tick();

    for _ in 0..5 {
        let report = monitor.tick();
        let numa = report.numa.ready().expect("numa metrics");
        assert_eq!(numa.swap_pages, 0);
        assert!(!report.flags.contains(FlagKind::Swapping));
    }
}

#[test]
fn swap_traffic_is_flagged() {
    let tree = ProcTree::new();
    let mut monitor = tree.monitor();
    monitor.tick();

    tree.vmstat(30, 70);
    let report = monitor.tick();
    let numa = report.numa.ready().expect("numa metrics");
    assert_eq!(numa.swap_pages, 100);
    assert!(report.flags.contains(FlagKind::Swapping));
    assert_eq!(report.analysis.health, HealthState::AttentionRequired);
}

#[test]
fn busy_process_is_named_in_flags() {
    let tree = ProcTree::new();
    let mut monitor = tree.monitor();
    monitor.tick();

    tree.process(400, 5000);
    let report = monitor.tick();
    let processes = report.processes.ready().expect("process metrics");
    assert_eq!(processes.top_cpu, vec![42]);

    let intensive: Vec<_> = report
        .flags
        .of_kind(FlagKind::CpuIntensive)
        .filter_map(|flag| flag.subject.as_deref())
        .collect();
    assert_eq!(intensive, vec!["42 (worker)"]);
}

#[test]
fn device_queue_capacity_comes_from_sysfs() {
    let tree = ProcTree::new();
    let mut monitor = tree.monitor();
    monitor.tick();

    tree.write(
        "diskstats",
        " 259 0 nvme0n1 200 0 1600 100 300 0 2400 160 200 240 260\n",
    );
    let report = monitor.tick();
    let storage = report.storage.ready().expect("storage metrics");
    let device = &storage.devices[0];
    assert_eq!(device.queue_capacity, 1023);
    assert_eq!(device.queue_depth, 200);
    assert_eq!(device.completed_ios, 200);
    assert!(!report.flags.contains(FlagKind::QueueBottleneck));
}

#[test]
fn hardware_queue_depth_wins_over_request_pool() {
    let tree = ProcTree::new();
    let device_dir = tree.sys_root.join("block/nvme0n1/device");
    fs::create_dir_all(&device_dir).expect("device dir");
    fs::write(device_dir.join("queue_depth"), "32\n").expect("queue_depth");
    let mut monitor = tree.monitor();
    monitor.tick();

    tree.write(
        "diskstats",
        " 259 0 nvme0n1 200 0 1600 100 300 0 2400 160 40 240 260\n",
    );
    let report = monitor.tick();
    let storage = report.storage.ready().expect("storage metrics");
    let device = &storage.devices[0];
    assert_eq!(device.queue_capacity, 32);
    assert_eq!(device.queue_depth, 40);
    assert!(report.flags.contains(FlagKind::QueueBottleneck));
    assert_eq!(device.scheduler, None);
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("sysprobe.json");
    fs::write(&path, body).expect("write config");
    path
}

#[test]
fn config_is_loaded_from_environment() {
    let _guard = TEST_ENV_GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let temp = TempDir::new().expect("temp dir");
    let path = write_config(
        temp.path(),
        r#"{ "interval_ms": 2000, "thresholds": { "perf": { "min_cache_hit_rate": 70.0 } } }"#,
    );

    let previous = std::env::var_os(CONFIG_ENV_VAR);
    std::env::set_var(CONFIG_ENV_VAR, &path);
    let loaded = MonitorConfig::load(None);
    match previous {
        Some(value) => std::env::set_var(CONFIG_ENV_VAR, value),
        None => std::env::remove_var(CONFIG_ENV_VAR),
    }

    let config = loaded.expect("config from env");
    assert_eq!(config.interval_ms, 2000);
    assert_eq!(config.thresholds.perf.min_cache_hit_rate, 70.0);
    assert_eq!(config.thresholds.perf.min_ipc, MonitorConfig::default().thresholds.perf.min_ipc);
}

#[test]
fn explicit_config_wins_and_is_validated() {
    let _guard = TEST_ENV_GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let temp = TempDir::new().expect("temp dir");
    let path = write_config(temp.path(), r#"{ "interval_ms": 5 }"#);
    assert!(MonitorConfig::load(Some(&path)).is_err());

    let path = write_config(temp.path(), r#"{ "device_pattern": "(" }"#);
    assert!(MonitorConfig::load(Some(&path)).is_err());
}

#![cfg(test)]

use super::*;
use crate::config::Thresholds;
use crate::metrics::{
    CpuMetrics, DeviceMetrics, MemoryMetrics, NumaMetrics, PerfMetrics, ProcessMetrics,
    ProcessesMetrics, StorageMetrics,
};

fn classifier() -> BottleneckClassifier {
    BottleneckClassifier::new(&Thresholds::default())
}

fn device(name: &str, iops: f64, queue_depth: u64, queue_capacity: u64) -> DeviceMetrics {
    DeviceMetrics {
        device: name.to_string(),
        total_iops: iops,
        completed_ios: iops as u64,
        queue_depth,
        queue_capacity,
        ..DeviceMetrics::default()
    }
}

fn thrashing_perf() -> PerfMetrics {
    PerfMetrics {
        cache_references: Some(1000),
        cache_misses: Some(250),
        cache_hit_rate: Some(75.0),
        ..PerfMetrics::default()
    }
}

#[test]
fn empty_record_is_healthy() {
    let flags = classifier().classify(&MetricsRecord::default());
    assert!(flags.is_empty());
    let analysis = CorrelationAnalyzer::new(&Thresholds::default()).analyze(&flags);
    assert_eq!(analysis.health, HealthState::Healthy);
    assert!(analysis.findings.is_empty());
}

#[test]
fn low_cache_hit_rate_is_thrashing() {
    let perf = thrashing_perf();
    let flags = classifier().classify(&MetricsRecord {
        perf: Some(&perf),
        ..MetricsRecord::default()
    });
    assert!(flags.contains(FlagKind::CacheThrashing));
    let flag = flags.of_kind(FlagKind::CacheThrashing).next().unwrap();
    assert_eq!(flag.domain, Domain::Perf);
    assert_eq!(flag.value, 75.0);
}

#[test]
fn idle_denominators_are_not_bottlenecks() {
    let perf = PerfMetrics {
        cycles: Some(0),
        instructions: Some(0),
        ipc: Some(0.0),
        cache_references: Some(0),
        cache_misses: Some(0),
        cache_hit_rate: Some(0.0),
        branch_instructions: None,
        branch_miss_rate: None,
        ..PerfMetrics::default()
    };
    let flags = classifier().classify(&MetricsRecord {
        perf: Some(&perf),
        ..MetricsRecord::default()
    });
    assert!(flags.is_empty(), "unexpected flags: {:?}", flags);
}

#[test]
fn low_ipc_and_mispredicts() {
    let perf = PerfMetrics {
        cycles: Some(1000),
        ipc: Some(0.5),
        branch_instructions: Some(100),
        branch_miss_rate: Some(6.0),
        ..PerfMetrics::default()
    };
    let flags = classifier().classify(&MetricsRecord {
        perf: Some(&perf),
        ..MetricsRecord::default()
    });
    assert!(flags.contains(FlagKind::CpuBound));
    assert!(flags.contains(FlagKind::BranchMispredicting));
}

#[test]
fn queue_over_capacity_is_bottleneck() {
    let storage = StorageMetrics {
        devices: vec![device("nvme0n1", 500.0, 130, 128)],
        warming_up: Vec::new(),
    };
    let flags = classifier().classify(&MetricsRecord {
        storage: Some(&storage),
        ..MetricsRecord::default()
    });
    let bottleneck: Vec<_> = flags.of_kind(FlagKind::QueueBottleneck).collect();
    assert_eq!(bottleneck.len(), 1);
    assert_eq!(bottleneck[0].subject.as_deref(), Some("nvme0n1"));
    assert_eq!(bottleneck[0].value, 130.0);
}

#[test]
fn idle_device_is_never_flagged() {
    let storage = StorageMetrics {
        devices: vec![device("sda", 0.0, 200, 128)],
        warming_up: Vec::new(),
    };
    let flags = classifier().classify(&MetricsRecord {
        storage: Some(&storage),
        ..MetricsRecord::default()
    });
    assert!(flags.is_empty());
}

#[test]
fn top_quartile_of_busy_devices_is_hot() {
    let storage = StorageMetrics {
        devices: vec![
            device("sda", 10.0, 1, 128),
            device("sdb", 900.0, 1, 128),
            device("sdc", 50.0, 1, 128),
            device("sdd", 20.0, 1, 128),
            device("sde", 0.0, 0, 128),
        ],
        warming_up: Vec::new(),
    };
    let flags = classifier().classify(&MetricsRecord {
        storage: Some(&storage),
        ..MetricsRecord::default()
    });
    let hot: Vec<_> = flags
        .of_kind(FlagKind::HotDevice)
        .filter_map(|flag| flag.subject.clone())
        .collect();
    assert_eq!(hot, vec!["sdb".to_string()]);
}

#[test]
fn memory_flags() {
    let memory = MemoryMetrics {
        total_kb: 1000,
        usage_percent: 95.0,
        available_percent: 5.0,
        dirty_percent: 6.0,
        cache_percent: 30.0,
        ..MemoryMetrics::default()
    };
    let flags = classifier().classify(&MetricsRecord {
        memory: Some(&memory),
        ..MetricsRecord::default()
    });
    for kind in [
        FlagKind::MemoryPressure,
        FlagKind::WriteBottleneck,
        FlagKind::MemoryExhausted,
        FlagKind::DirtyBacklog,
    ] {
        assert!(flags.contains(kind), "missing {}", kind.label());
    }
}

#[test]
fn no_swap_traffic_means_no_swapping() {
    let numa = NumaMetrics::default();
    for _ in 0..5 {
        let flags = classifier().classify(&MetricsRecord {
            numa: Some(&numa),
            ..MetricsRecord::default()
        });
        assert!(!flags.contains(FlagKind::Swapping));
    }
}

#[test]
fn classification_is_repeatable() {
    let perf = thrashing_perf();
    let cpu = CpuMetrics {
        usage: 97.0,
        iowait: 25.0,
        total_ticks: 100,
        ..CpuMetrics::default()
    };
    let record = MetricsRecord {
        cpu: Some(&cpu),
        perf: Some(&perf),
        ..MetricsRecord::default()
    };
    let classifier = classifier();
    let first = classifier.classify(&record);
    for _ in 0..10 {
        assert_eq!(classifier.classify(&record), first);
    }
}

#[test]
fn thresholds_are_injected() {
    let mut thresholds = Thresholds::default();
    thresholds.perf.min_cache_hit_rate = 70.0;
    let perf = thrashing_perf();
    let flags = BottleneckClassifier::new(&thresholds).classify(&MetricsRecord {
        perf: Some(&perf),
        ..MetricsRecord::default()
    });
    assert!(!flags.contains(FlagKind::CacheThrashing));
}

#[test]
fn iowait_with_queue_bottleneck_blames_storage() {
    let cpu = CpuMetrics {
        usage: 40.0,
        iowait: 30.0,
        total_ticks: 100,
        ..CpuMetrics::default()
    };
    let storage = StorageMetrics {
        devices: vec![device("sda", 100.0, 200, 128)],
        warming_up: Vec::new(),
    };
    let flags = classifier().classify(&MetricsRecord {
        cpu: Some(&cpu),
        storage: Some(&storage),
        ..MetricsRecord::default()
    });
    let analysis = CorrelationAnalyzer::new(&Thresholds::default()).analyze(&flags);

    assert_eq!(analysis.health, HealthState::AttentionRequired);
    assert_eq!(
        analysis.findings[0].explanation,
        "storage is the bottleneck, CPU blocked on I/O"
    );
    // the lone busy device is also hot, which no composite rule consumes here
    let explanations: Vec<_> = analysis
        .findings
        .iter()
        .map(|finding| finding.explanation.as_str())
        .collect();
    assert_eq!(explanations.len(), 2);
    assert_eq!(explanations[1], FlagKind::HotDevice.explain().0);
}

#[test]
fn saturated_inefficient_cpu() {
    let mut flags = FlagSet::new();
    flags.push(BottleneckFlag::new(FlagKind::CpuSaturated, 95.0));
    flags.push(BottleneckFlag::new(FlagKind::CpuBound, 0.4));
    let analysis = CorrelationAnalyzer::new(&Thresholds::default()).analyze(&flags);
    assert_eq!(analysis.findings.len(), 1);
    assert_eq!(analysis.findings[0].explanation, "CPU saturated and inefficient");
    assert_eq!(analysis.findings[0].flags.len(), 2);
}

#[test]
fn exhausted_memory_under_pressure() {
    let flags: FlagSet = [
        BottleneckFlag::new(FlagKind::MemoryExhausted, 96.0),
        BottleneckFlag::new(FlagKind::MemoryPressured, 75.0),
    ]
    .into_iter()
    .collect();
    let analysis = CorrelationAnalyzer::new(&Thresholds::default()).analyze(&flags);
    assert_eq!(analysis.findings.len(), 1);
    assert_eq!(analysis.findings[0].explanation, "memory exhausted under pressure");
}

#[test]
fn many_cpu_intensive_processes_correlate() {
    let processes = ProcessesMetrics {
        processes: (0..6)
            .map(|pid| ProcessMetrics {
                pid,
                comm: format!("worker{}", pid),
                cpu_percent: 80.0,
                ..ProcessMetrics::default()
            })
            .collect(),
        ..ProcessesMetrics::default()
    };
    let flags = classifier().classify(&MetricsRecord {
        processes: Some(&processes),
        ..MetricsRecord::default()
    });
    assert_eq!(flags.count(FlagKind::CpuIntensive), 6);

    let analysis = CorrelationAnalyzer::new(&Thresholds::default()).analyze(&flags);
    assert_eq!(analysis.findings.len(), 1);
    assert_eq!(
        analysis.findings[0].explanation,
        "many CPU-intensive processes are competing"
    );
    assert_eq!(analysis.findings[0].flags.len(), 6);
}

#[test]
fn lone_flag_gets_its_own_finding() {
    let flags: FlagSet = [BottleneckFlag::on(FlagKind::NumaImbalance, "node1", 45.0)]
        .into_iter()
        .collect();
    let analysis = CorrelationAnalyzer::new(&Thresholds::default()).analyze(&flags);
    assert_eq!(analysis.health, HealthState::AttentionRequired);
    assert_eq!(analysis.findings.len(), 1);
    assert_eq!(analysis.findings[0].flags[0].kind, FlagKind::NumaImbalance);
}

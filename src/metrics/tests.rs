#![cfg(test)]

use super::*;
use crate::config::PressureWeights;
use crate::procfs::{CpuTimes, MemInfo, NodeInfo, ProcessIo, ProcessSample};
use chrono::Utc;
use std::collections::BTreeMap;
use std::io;
use std::time::{Duration, Instant};

fn one_second_apart(previous: Snapshot, current_at: impl FnOnce(Instant) -> Snapshot) -> Deltas {
    let current = current_at(previous.timestamp() + Duration::from_secs(1));
    match DeltaEngine::diff(Some(&previous), &current) {
        Metrics::Ready(deltas) => deltas,
        other => panic!("expected deltas, got {:?}", other),
    }
}

#[test]
fn envelope_fresh_preserves_metadata() {
    let start = Utc::now();
    let envelope = SampleEnvelope::fresh(
        Metrics::Ready(42u8),
        start,
        Duration::from_millis(1500),
        Duration::from_millis(12),
        "unit-test",
    );
    assert_eq!(envelope.ready(), Some(&42));
    assert_eq!(envelope.source, "unit-test");
    assert_eq!(envelope.valid_for_ms, 1500);
    assert_eq!(envelope.latency_ms, 12);
    assert!(envelope.error.is_none());
}

#[test]
fn envelope_errored_is_source_absent() {
    let envelope: SampleEnvelope<u8> = SampleEnvelope::errored(
        Utc::now(),
        Duration::from_secs(1),
        Duration::ZERO,
        "unit-test",
        "boom".to_string(),
    );
    assert_eq!(envelope.value.unavailable(), Some(Unavailable::SourceAbsent));
    assert_eq!(envelope.error.as_deref(), Some("boom"));
}

#[test]
fn counter_regression_clamps_to_zero() {
    assert_eq!(counter_delta(100, 150), 50);
    assert_eq!(counter_delta(150, 150), 0);
    assert_eq!(counter_delta(u64::MAX, 3), 0);
}

#[test]
fn percent_of_zero_whole_is_zero() {
    assert_eq!(compute_percent(5.0, 0.0), 0.0);
    assert_eq!(compute_percent(0.0, 0.0), 0.0);
    assert_eq!(compute_percent(25.0, 100.0), 25.0);
}

#[test]
fn first_sample_is_not_zero() {
    let current = Snapshot::new(Instant::now()).with_counter("reads", 10);
    assert_eq!(
        DeltaEngine::diff(None, &current),
        Metrics::Unavailable(Unavailable::FirstSample)
    );
}

#[test]
fn same_instant_is_undefined() {
    let at = Instant::now();
    let previous = Snapshot::new(at).with_counter("reads", 10);
    let current = Snapshot::new(at).with_counter("reads", 20);
    assert_eq!(
        DeltaEngine::diff(Some(&previous), &current),
        Metrics::Unavailable(Unavailable::ZeroElapsed)
    );
    assert_eq!(compute_rate(&previous, &current, "reads"), None);
}

#[test]
fn earlier_current_timestamp_is_undefined() {
    let at = Instant::now();
    let previous = Snapshot::new(at + Duration::from_secs(1)).with_counter("reads", 10);
    let current = Snapshot::new(at).with_counter("reads", 20);
    assert!(!DeltaEngine::diff(Some(&previous), &current).is_ready());
}

#[test]
fn rate_divides_by_elapsed_and_skips_missing_counters() {
    let at = Instant::now();
    let previous = Snapshot::new(at).with_counter("reads", 100);
    let current = Snapshot::new(at + Duration::from_millis(500))
        .with_counter("reads", 150)
        .with_counter("writes", 9);
    assert_eq!(compute_rate(&previous, &current, "reads"), Some(100.0));
    assert_eq!(compute_rate(&previous, &current, "writes"), None);

    let Metrics::Ready(deltas) = DeltaEngine::diff(Some(&previous), &current) else {
        panic!("expected deltas");
    };
    assert_eq!(deltas.delta("reads"), Some(50));
    assert_eq!(deltas.delta("writes"), None);
    assert_eq!(deltas.total(&["reads", "writes"]), None);
}

#[test]
fn keyed_diff_marks_new_entities_as_first_sample() {
    let at = Instant::now();
    let mut previous = KeyedSnapshots::new();
    previous.insert("sda".to_string(), Snapshot::new(at).with_counter("reads", 1));
    previous.insert("sdb".to_string(), Snapshot::new(at).with_counter("reads", 1));
    let later = at + Duration::from_secs(1);
    let mut current = KeyedSnapshots::new();
    current.insert("sda".to_string(), Snapshot::new(later).with_counter("reads", 5));
    current.insert("sdc".to_string(), Snapshot::new(later).with_counter("reads", 5));

    let Metrics::Ready(per_device) = DeltaEngine::diff_keyed(Some(&previous), &current) else {
        panic!("expected per-device deltas");
    };
    assert_eq!(per_device.len(), 2);
    assert_eq!(per_device["sda"].ready().and_then(|d| d.delta("reads")), Some(4));
    assert_eq!(
        per_device["sdc"].unavailable(),
        Some(Unavailable::FirstSample)
    );
}

#[test]
fn ring_swaps_slots_and_clears() {
    let mut ring = SnapshotRing::new();
    assert!(ring.is_empty());
    ring.push(1);
    assert_eq!((ring.previous(), ring.current()), (None, Some(&1)));
    ring.push(2);
    assert_eq!((ring.previous(), ring.current()), (Some(&1), Some(&2)));
    ring.push(3);
    assert_eq!((ring.previous(), ring.current()), (Some(&2), Some(&3)));
    ring.clear();
    assert!(ring.current().is_none());
    ring.push(4);
    assert_eq!((ring.previous(), ring.current()), (None, Some(&4)));
}

#[test]
fn failed_read_restarts_from_first_sample() {
    let mut state: SourceState<Snapshot> = SourceState::new("unit-test");
    let at = Instant::now();
    let step = |state: &mut SourceState<Snapshot>, reading: Result<Snapshot, io::Error>| {
        state.collect(Instant::now(), Duration::from_secs(1), reading, DeltaEngine::diff_ring)
    };

    let first = step(&mut state, Ok(Snapshot::new(at).with_counter("c", 1)));
    assert_eq!(first.value.unavailable(), Some(Unavailable::FirstSample));

    let second = step(
        &mut state,
        Ok(Snapshot::new(at + Duration::from_secs(1)).with_counter("c", 5)),
    );
    assert!(second.value.is_ready());

    let failed = step(&mut state, Err(io::Error::new(io::ErrorKind::NotFound, "gone")));
    assert_eq!(failed.value.unavailable(), Some(Unavailable::SourceAbsent));
    assert!(failed.error.is_some());
    assert!(state.is_failing());

    let recovered = step(
        &mut state,
        Ok(Snapshot::new(at + Duration::from_secs(3)).with_counter("c", 9)),
    );
    assert_eq!(recovered.value.unavailable(), Some(Unavailable::FirstSample));
    assert!(!state.is_failing());
}

#[test]
fn cpu_user_share_uses_total_bucket_delta() {
    let before = CpuTimes {
        user: 100,
        idle: 900,
        ..CpuTimes::default()
    };
    let after = CpuTimes {
        user: 150,
        idle: 950,
        ..CpuTimes::default()
    };
    let deltas = one_second_apart(cpu_snapshot(&before, Instant::now()), |at| {
        cpu_snapshot(&after, at)
    });
    let metrics = cpu_metrics(&deltas);
    assert!((metrics.user - 50.0).abs() < 1e-9);
    assert!((metrics.idle - 50.0).abs() < 1e-9);
    assert!((metrics.usage - 50.0).abs() < 1e-9);
    assert_eq!(metrics.system, 0.0);
    assert_eq!(metrics.total_ticks, 100);
}

#[test]
fn cpu_without_progress_reports_zero_usage() {
    let times = CpuTimes {
        user: 10,
        idle: 10,
        ..CpuTimes::default()
    };
    let deltas = one_second_apart(cpu_snapshot(&times, Instant::now()), |at| {
        cpu_snapshot(&times, at)
    });
    let metrics = cpu_metrics(&deltas);
    assert_eq!(metrics.usage, 0.0);
    assert_eq!(metrics.idle, 0.0);
}

#[test]
fn memory_metrics_from_single_snapshot() {
    let info = MemInfo {
        total: 1000,
        available: 50,
        buffers: 10,
        cached: 40,
        dirty: 60,
        writeback: 5,
        ..MemInfo::default()
    };
    let metrics = memory_metrics(&memory_snapshot(&info, Instant::now()));
    assert!((metrics.usage_percent - 95.0).abs() < 1e-9);
    assert!((metrics.available_percent - 5.0).abs() < 1e-9);
    assert!((metrics.buffer_efficiency - 20.0).abs() < 1e-9);
    assert!((metrics.cache_efficiency - 80.0).abs() < 1e-9);
    assert!((metrics.dirty_percent - 6.0).abs() < 1e-9);
    assert!((metrics.cache_percent - 5.0).abs() < 1e-9);

    let empty = memory_metrics(&memory_snapshot(&MemInfo::default(), Instant::now()));
    assert_eq!(empty.usage_percent, 0.0);
    assert_eq!(empty.buffer_efficiency, 0.0);
}

#[test]
fn device_metrics_follow_iostat_definitions() {
    let at = Instant::now();
    let previous = Snapshot::new(at)
        .with_counter("reads", 0)
        .with_counter("writes", 0)
        .with_counter("read_sectors", 0)
        .with_counter("write_sectors", 0)
        .with_counter("read_time_ms", 0)
        .with_counter("write_time_ms", 0)
        .with_counter("io_time_ms", 0)
        .with_counter("weighted_io_time_ms", 0);
    let deltas = one_second_apart(previous, |later| {
        Snapshot::new(later)
            .with_counter("reads", 300)
            .with_counter("writes", 100)
            .with_counter("read_sectors", 2048)
            .with_counter("write_sectors", 4096)
            .with_counter("read_time_ms", 600)
            .with_counter("write_time_ms", 200)
            .with_counter("io_time_ms", 500)
            .with_counter("weighted_io_time_ms", 2000)
            .with_gauge("io_in_progress", 130)
            .with_gauge("queue_capacity", 128)
    });

    let device = device_metrics("nvme0n1", &deltas);
    assert_eq!(device.completed_ios, 400);
    assert!((device.total_iops - 400.0).abs() < 1e-9);
    assert!((device.read_mbps - 1.0).abs() < 1e-9);
    assert!((device.write_mbps - 2.0).abs() < 1e-9);
    assert!((device.await_ms - 2.0).abs() < 1e-9);
    assert!((device.service_time_ms - 1.25).abs() < 1e-9);
    assert!((device.utilization_percent - 50.0).abs() < 1e-9);
    assert!((device.avg_queue_size - 2.0).abs() < 1e-9);
    assert_eq!(device.queue_depth, 130);
    assert!(device.queue_utilization_percent > 100.0);
}

#[test]
fn swapping_stays_off_without_swap_traffic() {
    let weights = PressureWeights::default();
    let mut previous = Snapshot::new(Instant::now())
        .with_counter("pswpin", 7)
        .with_counter("pswpout", 7);
    for _ in 0..5 {
        let deltas = one_second_apart(previous.clone(), |at| {
            Snapshot::new(at)
                .with_counter("pswpin", 7)
                .with_counter("pswpout", 7)
        });
        let metrics = numa_metrics(&deltas, &[], &weights);
        assert!(!metrics.is_swapping());
        assert_eq!(metrics.pressure_score, 0.0);
        previous = Snapshot::new(previous.timestamp() + Duration::from_secs(1))
            .with_counter("pswpin", 7)
            .with_counter("pswpout", 7);
    }
}

#[test]
fn pressure_score_adds_each_crossed_component() {
    let weights = PressureWeights::default();
    let previous = Snapshot::new(Instant::now())
        .with_counter("pgmajfault", 0)
        .with_counter("pgscan", 0)
        .with_counter("pswpin", 0)
        .with_counter("pswpout", 0);
    let deltas = one_second_apart(previous, |at| {
        Snapshot::new(at)
            .with_counter("pgmajfault", 11)
            .with_counter("pgscan", 10)
            .with_counter("pswpin", 1)
            .with_counter("pswpout", 0)
            .with_gauge("nr_dirty", 1001)
    });
    let metrics = numa_metrics(&deltas, &[], &weights);
    assert!(metrics.is_swapping());
    assert!((metrics.pressure_score - (20.0 + 30.0 + 40.0)).abs() < 1e-9);
}

#[test]
fn node_imbalance_needs_two_nodes() {
    let node = |id, total, free| NodeInfo {
        id,
        mem_total_kb: total,
        mem_free_kb: free,
        cpus: vec![id],
    };
    let deltas = one_second_apart(Snapshot::new(Instant::now()), Snapshot::new);
    let weights = PressureWeights::default();

    let single = numa_metrics(&deltas, &[node(0, 100, 10)], &weights);
    assert_eq!(single.imbalance_percent, None);
    assert!((single.nodes[0].usage_percent - 90.0).abs() < 1e-9);

    let pair = numa_metrics(&deltas, &[node(0, 100, 10), node(1, 100, 80)], &weights);
    assert!((pair.imbalance_percent.unwrap() - 70.0).abs() < 1e-9);
}

#[test]
fn perf_rates_from_counter_deltas() {
    let previous = Snapshot::new(Instant::now())
        .with_counter(CACHE_REFERENCES, 0)
        .with_counter(CACHE_MISSES, 0)
        .with_counter(CYCLES, 0)
        .with_counter(INSTRUCTIONS, 0);
    let deltas = one_second_apart(previous, |at| {
        Snapshot::new(at)
            .with_counter(CACHE_REFERENCES, 1000)
            .with_counter(CACHE_MISSES, 250)
            .with_counter(CYCLES, 0)
            .with_counter(INSTRUCTIONS, 0)
    });
    let metrics = perf_metrics(&deltas, vec![BRANCH_MISSES.to_string()]);
    assert_eq!(metrics.cache_hit_rate, Some(75.0));
    assert_eq!(metrics.ipc, Some(0.0));
    assert_eq!(metrics.cycles, Some(0));
    assert_eq!(metrics.branch_miss_rate, None);
    assert_eq!(metrics.context_switch_rate, None);
    assert_eq!(metrics.unavailable, vec![BRANCH_MISSES.to_string()]);
}

#[test]
fn perf_ratios_stay_in_range() {
    assert_eq!(cache_hit_rate(100, 400), 0.0);
    assert_eq!(branch_miss_rate(10, 40), 100.0);
    assert_eq!(branch_miss_rate(0, 5), 0.0);
    assert_eq!(ipc(10, 0), 0.0);
    assert!((ipc(300, 100) - 3.0).abs() < 1e-9);
}

#[test]
fn process_metrics_scale_ticks_and_pages() {
    let units = ProcessUnits {
        clock_ticks_per_sec: 100,
        page_size: 4096,
    };
    let sample = |utime, syscr, read_bytes, rchar| ProcessSample {
        pid: 9,
        comm: "db".to_string(),
        state: 'R',
        utime,
        stime: 0,
        rss_pages: 512 * 1024,
        num_threads: 4,
        io: Some(ProcessIo {
            rchar,
            syscr,
            read_bytes,
            ..ProcessIo::default()
        }),
        ..ProcessSample::default()
    };
    let at = Instant::now();
    let previous = process_table(&[sample(0, 0, 0, 0)], at);
    let current = process_table(&[sample(50, 10, 20_000, 80_000)], at + Duration::from_secs(1));

    let Metrics::Ready(per_pid) =
        DeltaEngine::diff_keyed(Some(&previous.snapshots), &current.snapshots)
    else {
        panic!("expected per-process deltas");
    };
    let metrics = processes_metrics(per_pid, &current.labels, units, 5);
    let db = metrics.get(9).expect("process 9");
    assert!((db.cpu_percent - 50.0).abs() < 1e-9);
    assert!((db.rss_mb - 2048.0).abs() < 1e-9);
    assert_eq!(db.bytes_per_read_syscall, Some(2000.0));
    assert_eq!(db.cache_hit_rate, Some(75.0));
    assert_eq!(db.comm, "db");
    assert_eq!(metrics.top_cpu, vec![9]);
}

#[test]
fn process_without_io_access_has_no_io_figures() {
    let units = ProcessUnits {
        clock_ticks_per_sec: 100,
        page_size: 4096,
    };
    let sample = ProcessSample {
        pid: 1,
        comm: "init".to_string(),
        state: 'S',
        ..ProcessSample::default()
    };
    let at = Instant::now();
    let previous = process_table(&[sample.clone()], at);
    let mut labels = BTreeMap::new();
    labels.insert(
        1,
        ProcessLabel {
            comm: "init".to_string(),
            state: 'S',
        },
    );
    let current = process_table(&[sample], at + Duration::from_secs(1));
    let Metrics::Ready(per_pid) =
        DeltaEngine::diff_keyed(Some(&previous.snapshots), &current.snapshots)
    else {
        panic!("expected per-process deltas");
    };
    let metrics = processes_metrics(per_pid, &labels, units, 5);
    let init = metrics.get(1).expect("process 1");
    assert_eq!(init.cache_hit_rate, None);
    assert_eq!(init.bytes_per_read_syscall, None);
    assert_eq!(init.io_rate(), 0.0);
}

#[test]
fn named_interrupts_use_known_descriptions() {
    let mut known = BTreeMap::new();
    known.insert("LOC".to_string(), "Local timer interrupts".to_string());
    let from_file = "IO-APIC 2-edge timer".to_string();
    assert_eq!(
        describe_interrupt("LOC", Some(&"ignored".to_string()), &known),
        "Local timer interrupts"
    );
    assert_eq!(describe_interrupt("0", Some(&from_file), &known), from_file);
    assert_eq!(describe_interrupt("99", None, &known), "");
}

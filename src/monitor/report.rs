use std::fmt::{self, Display, Formatter};

use bytesize::ByteSize;

use crate::analysis::HealthState;
use crate::metrics::{
    CpuMetrics, InterruptMetrics, MemoryMetrics, Metrics, NumaMetrics, PerfMetrics,
    ProcessesMetrics, SampleEnvelope, StorageMetrics, Unavailable,
};

use super::monitor::TickReport;

pub fn render_text(report: &TickReport) -> String {
    TextReport(report).to_string()
}

pub fn render_json(report: &TickReport) -> serde_json::Result<String> {
    serde_json::to_string(report)
}

/// Terminal rendering of one tick. Disabled domains are left out.
pub struct TextReport<'a>(pub &'a TickReport);

impl Display for TextReport<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let host = &report.host;
        writeln!(
            f,
            "== {} | {} | kernel {} | {} CPUs | {} RAM | tick {} @ {}",
            host.hostname,
            host.os_name,
            host.kernel_version,
            host.cpu_count,
            ByteSize::b(host.total_memory_bytes),
            report.tick,
            report.captured_at.format("%H:%M:%S")
        )?;

        section(f, "CPU", &report.cpu, write_cpu)?;
        section(f, "Interrupts", &report.interrupts, write_interrupts)?;
        section(f, "Memory", &report.memory, write_memory)?;
        section(f, "Storage", &report.storage, write_storage)?;
        section(f, "NUMA", &report.numa, write_numa)?;
        section(f, "Perf counters", &report.perf, write_perf)?;
        section(f, "Processes", &report.processes, write_processes)?;

        writeln!(f, "{}", report.analysis.health.label())?;
        if report.analysis.health == HealthState::AttentionRequired {
            for finding in &report.analysis.findings {
                let subjects: Vec<&str> = finding
                    .flags
                    .iter()
                    .filter_map(|flag| flag.subject.as_deref())
                    .collect();
                if subjects.is_empty() {
                    writeln!(f, "  * {}", finding.explanation)?;
                } else {
                    writeln!(f, "  * {} [{}]", finding.explanation, subjects.join(", "))?;
                }
                writeln!(f, "    -> {}", finding.advice)?;
            }
        }
        Ok(())
    }
}

fn section<T>(
    f: &mut Formatter<'_>,
    title: &str,
    envelope: &SampleEnvelope<T>,
    body: impl FnOnce(&mut Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    match &envelope.value {
        Metrics::Unavailable(Unavailable::Disabled) => Ok(()),
        Metrics::Unavailable(reason) => match &envelope.error {
            Some(error) => writeln!(f, "{}: unavailable ({})", title, error),
            None => writeln!(f, "{}: {}", title, reason.describe()),
        },
        Metrics::Ready(value) => {
            writeln!(f, "{}:", title)?;
            body(f, value)
        }
    }
}

fn write_cpu(f: &mut Formatter<'_>, cpu: &CpuMetrics) -> fmt::Result {
    writeln!(
        f,
        "  usage {:5.1}%  user {:.1}%  system {:.1}%  iowait {:.1}%  steal {:.1}%",
        cpu.usage, cpu.user, cpu.system, cpu.iowait, cpu.steal
    )?;
    writeln!(
        f,
        "  nice {:.1}%  irq {:.1}%  softirq {:.1}%  guest {:.1}%  idle {:.1}%",
        cpu.nice, cpu.irq, cpu.softirq, cpu.guest, cpu.idle
    )
}

fn write_interrupts(f: &mut Formatter<'_>, interrupts: &InterruptMetrics) -> fmt::Result {
    writeln!(f, "  total {:.0}/s", interrupts.total_rate)?;
    for line in &interrupts.top {
        writeln!(f, "  {:>8} {:>10.0}/s  {}", line.name, line.rate, line.description)?;
    }
    Ok(())
}

fn write_memory(f: &mut Formatter<'_>, memory: &MemoryMetrics) -> fmt::Result {
    writeln!(
        f,
        "  used {:.1}% of {}  available {} ({:.1}%)",
        memory.usage_percent,
        ByteSize::kib(memory.total_kb),
        ByteSize::kib(memory.available_kb),
        memory.available_percent
    )?;
    writeln!(
        f,
        "  buffers {}  cached {} ({:.1}% of RAM)  dirty {} ({:.2}%)  writeback {} ({:.2}%)",
        ByteSize::kib(memory.buffers_kb),
        ByteSize::kib(memory.cached_kb),
        memory.cache_percent,
        ByteSize::kib(memory.dirty_kb),
        memory.dirty_percent,
        ByteSize::kib(memory.writeback_kb),
        memory.writeback_percent
    )
}

fn write_storage(f: &mut Formatter<'_>, storage: &StorageMetrics) -> fmt::Result {
    if storage.devices.is_empty() && storage.warming_up.is_empty() {
        return writeln!(f, "  no matching devices");
    }
    for device in &storage.devices {
        write!(
            f,
            "  {:<10} {:>8.1} IOPS  r {:.2} MB/s  w {:.2} MB/s  await {:.2} ms",
            device.device,
            device.total_iops,
            device.read_mbps,
            device.write_mbps,
            device.await_ms
        )?;
        write!(
            f,
            "  util {:.1}%  queue {}/{}",
            device.utilization_percent,
            device.queue_depth,
            device.queue_capacity
        )?;
        match &device.scheduler {
            Some(scheduler) => writeln!(f, "  sched {}", scheduler)?,
            None => writeln!(f)?,
        }
    }
    if !storage.warming_up.is_empty() {
        writeln!(f, "  warming up: {}", storage.warming_up.join(", "))?;
    }
    Ok(())
}

fn write_numa(f: &mut Formatter<'_>, numa: &NumaMetrics) -> fmt::Result {
    writeln!(
        f,
        "  faults {:.0}/s (major {:.1}/s)  swap in {:.1}/s out {:.1}/s  \
         scan {:.0}/s  pressure {:.0}",
        numa.page_fault_rate,
        numa.major_fault_rate,
        numa.swap_in_rate,
        numa.swap_out_rate,
        numa.scan_rate,
        numa.pressure_score
    )?;
    for node in &numa.nodes {
        writeln!(
            f,
            "  node{} {:.1}% of {}  cpus {}",
            node.id,
            node.usage_percent,
            ByteSize::kib(node.total_kb),
            node.cpus.len()
        )?;
    }
    if let Some(imbalance) = numa.imbalance_percent {
        writeln!(f, "  imbalance {:.1} points", imbalance)?;
    }
    Ok(())
}

fn write_perf(f: &mut Formatter<'_>, perf: &PerfMetrics) -> fmt::Result {
    let show = |value: Option<f64>, suffix: &str| match value {
        Some(value) => format!("{:.2}{}", value, suffix),
        None => "n/a".to_string(),
    };
    writeln!(
        f,
        "  IPC {}  cache hit {}  branch miss {}  ctx switches {}  page faults {}",
        show(perf.ipc, ""),
        show(perf.cache_hit_rate, "%"),
        show(perf.branch_miss_rate, "%"),
        show(perf.context_switch_rate, "/s"),
        show(perf.page_fault_rate, "/s")
    )?;
    if !perf.unavailable.is_empty() {
        writeln!(f, "  unavailable: {}", perf.unavailable.join(", "))?;
    }
    Ok(())
}

fn write_processes(f: &mut Formatter<'_>, processes: &ProcessesMetrics) -> fmt::Result {
    for (label, pids) in [
        ("cpu", &processes.top_cpu),
        ("memory", &processes.top_memory),
        ("io", &processes.top_io),
    ] {
        writeln!(f, "  top {}:", label)?;
        for process in pids.iter().filter_map(|pid| processes.get(*pid)) {
            writeln!(
                f,
                "    {:>7} {:<16} cpu {:5.1}%  rss {:8.1} MB  io {}/s  ctx {:.0}/s",
                process.pid,
                process.comm,
                process.cpu_percent,
                process.rss_mb,
                ByteSize::b(process.io_rate() as u64),
                process.context_switch_rate
            )?;
        }
    }
    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use sysprobe_lib::config::{MonitorConfig, PerfScope};
use sysprobe_lib::monitor::{render_json, render_text, run_until, shutdown_signal, Monitor};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScopeArg {
    /// Every process on every online CPU
    System,
    /// This process and its later children
    Process,
    /// Every process on the CPU given by --perf-cpu
    Cpu,
}

impl From<ScopeArg> for PerfScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::System => PerfScope::System,
            ScopeArg::Process => PerfScope::Process,
            ScopeArg::Cpu => PerfScope::Cpu,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sysprobe")]
#[command(version)]
#[command(
    about = "Samples kernel counters and explains where the system is stuck",
    long_about = None
)]
struct Cli {
    /// Read hardware performance counters
    #[arg(short, long)]
    perf: bool,

    /// Report NUMA and VM pressure
    #[arg(short, long)]
    numa: bool,

    /// Report per-process usage
    #[arg(short = 'r', long)]
    process: bool,

    /// Milliseconds between ticks
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Stop after this many ticks (0 runs until interrupted)
    #[arg(long, value_name = "N", default_value_t = 0)]
    ticks: u64,

    /// Print one JSON object per tick instead of text
    #[arg(long)]
    json: bool,

    /// Configuration file (JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// What the perf counters measure
    #[arg(long, value_enum)]
    perf_scope: Option<ScopeArg>,

    /// CPU counted when --perf-scope is cpu
    #[arg(long, value_name = "CPU")]
    perf_cpu: Option<usize>,

    /// Processes listed per top-N table
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, mut config: MonitorConfig) -> MonitorConfig {
        config.enable_perf |= self.perf;
        config.enable_numa |= self.numa;
        config.enable_process |= self.process;
        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }
        if let Some(scope) = self.perf_scope {
            config.perf_scope = scope.into();
        }
        if let Some(cpu) = self.perf_cpu {
            config.perf_cpu = cpu;
        }
        if let Some(top) = self.top {
            config.process_top_n = top;
        }
        config
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config =
        MonitorConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let config = cli.apply(config);
    if config.perf_scope != PerfScope::Cpu && cli.perf_cpu.is_some() {
        anyhow::bail!("--perf-cpu only applies with --perf-scope cpu");
    }
    let mut monitor = Monitor::new(config).context("invalid configuration")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        on_signal.cancel();
    });

    let max_ticks = (cli.ticks > 0).then_some(cli.ticks);
    let ran = run_until(&mut monitor, max_ticks, &cancel, |report| {
        if cli.json {
            match render_json(report) {
                Ok(line) => println!("{}", line),
                Err(err) => warn!("failed to encode tick {}: {}", report.tick, err),
            }
        } else {
            println!("{}", render_text(report));
        }
    })
    .await;

    info!("stopped after {} ticks", ran);
    Ok(())
}

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::select;
use tokio::sync::{Notify, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::monitor::{Monitor, TickReport};

/// Ticks `monitor` at its configured interval until `cancel` fires or
/// `max_ticks` ticks have run, handing every report to `on_report`.
/// Returns the number of ticks run.
///
/// A tick that overruns the interval delays the next one instead of
/// bunching catch-up ticks together.
pub async fn run_until(
    monitor: &mut Monitor,
    max_ticks: Option<u64>,
    cancel: &CancellationToken,
    mut on_report: impl FnMut(&TickReport),
) -> u64 {
    let mut ticker = interval(monitor.config().interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ran = 0u64;

    while max_ticks.map_or(true, |max| ran < max) {
        select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("sampler cancelled after {} ticks", ran);
                break;
            }
            _ = ticker.tick() => {
                let report = monitor.tick();
                on_report(&report);
                ran += 1;
            }
        }
    }
    ran
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("cannot listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Runs a [`Monitor`] in the background and keeps its latest report for
/// readers on other tasks or threads. The report sits behind one lock and is
/// replaced whole after every tick.
pub struct SamplerHandle {
    report: Arc<RwLock<Option<TickReport>>>,
    ready: Arc<AtomicBool>,
    notify_ready: Arc<Notify>,
    cancel: CancellationToken,
    _runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl SamplerHandle {
    /// Spawns onto the current tokio runtime, or onto a private one when
    /// called outside any runtime.
    pub fn spawn(monitor: Monitor) -> io::Result<Self> {
        let report = Arc::new(RwLock::new(None));
        let ready = Arc::new(AtomicBool::new(false));
        let notify_ready = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let inner = SamplerInner {
            report: Arc::clone(&report),
            ready: Arc::clone(&ready),
            notify_ready: Arc::clone(&notify_ready),
            cancel: cancel.clone(),
        };
        let fut = inner.run(monitor);

        let runtime_guard = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(fut);
                None
            }
            Err(_) => {
                let runtime = Arc::new(
                    tokio::runtime::Builder::new_multi_thread()
                        .worker_threads(1)
                        .enable_all()
                        .build()?,
                );
                runtime.spawn(fut);
                Some(runtime)
            }
        };

        Ok(SamplerHandle {
            report,
            ready,
            notify_ready,
            cancel,
            _runtime: runtime_guard,
        })
    }

    pub async fn latest_report(&self) -> Option<TickReport> {
        self.report.read().await.clone()
    }

    /// Waits for the first tick to complete.
    pub async fn wait_until_ready(&self) {
        let notified = self.notify_ready.notified();
        if self.ready.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SamplerInner {
    report: Arc<RwLock<Option<TickReport>>>,
    ready: Arc<AtomicBool>,
    notify_ready: Arc<Notify>,
    cancel: CancellationToken,
}

impl SamplerInner {
    async fn run(self, mut monitor: Monitor) {
        let mut ticker = interval(monitor.config().interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = self.cancel.cancelled() => {
                    break;
                }
                _ = ticker.tick() => {
                    let report = monitor.tick();
                    self.store_report(report).await;
                    if !self.ready.swap(true, Ordering::SeqCst) {
                        self.notify_ready.notify_waiters();
                    }
                }
            }
        }
    }

    async fn store_report(&self, report: TickReport) {
        let mut guard = self.report.write().await;
        *guard = Some(report);
    }
}

use std::collections::BTreeMap;
use std::time::Instant;

use log::{info, warn};
use serde::Serialize;

use crate::config::PerfScope;
use crate::metrics::Snapshot;

use super::counter::{CounterOpener, KernelOpener, PerfCounterHandle, PerfEvent};
use super::PerfError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    /// At least one event is counting.
    Live { opened: usize, requested: usize },
    /// No event could be opened; reads report every event unavailable.
    Unsupported { reason: String },
}

/// One tick's reading: the events that produced a value, and those that did
/// not.
#[derive(Clone, Debug)]
pub struct PerfReading {
    pub snapshot: Snapshot,
    pub unavailable: Vec<PerfEvent>,
}

/// Owns every open perf counter for the monitor. Handles are released on
/// [`close`](Self::close), on re-initialisation, and on drop.
pub struct PerfCounterSession {
    opener: Box<dyn CounterOpener>,
    scope: PerfScope,
    cpu: i32,
    events: Vec<PerfEvent>,
    handles: BTreeMap<PerfEvent, Vec<PerfCounterHandle>>,
    failed: Vec<PerfEvent>,
    state: SessionState,
}

impl PerfCounterSession {
    pub fn new(scope: PerfScope, cpu: usize) -> Self {
        Self::with_opener(Box::new(KernelOpener), scope, cpu)
    }

    pub fn with_opener(opener: Box<dyn CounterOpener>, scope: PerfScope, cpu: usize) -> Self {
        PerfCounterSession {
            opener,
            scope,
            cpu: cpu.min(i32::MAX as usize) as i32,
            events: PerfEvent::ALL.to_vec(),
            handles: BTreeMap::new(),
            failed: Vec::new(),
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn open_handles(&self) -> usize {
        self.handles.values().map(Vec::len).sum()
    }

    pub fn available_events(&self) -> Vec<PerfEvent> {
        self.handles.keys().copied().collect()
    }

    /// `(pid, cpu)` pairs for each handle of one event. The kernel rejects
    /// `pid = -1, cpu = -1`, so whole-system counting opens one handle per CPU.
    fn targets(&self) -> Vec<(i32, i32)> {
        match self.scope {
            PerfScope::System => self.opener.cpus().into_iter().map(|cpu| (-1, cpu)).collect(),
            PerfScope::Process => vec![(0, -1)],
            PerfScope::Cpu => vec![(-1, self.cpu)],
        }
    }

    fn open_event(
        &mut self,
        event: PerfEvent,
        targets: &[(i32, i32)],
    ) -> Result<Vec<PerfCounterHandle>, PerfError> {
        let mut handles = Vec::with_capacity(targets.len());
        for &(pid, cpu) in targets {
            let device = self.opener.open(event, pid, cpu)?;
            let mut handle = PerfCounterHandle::new(device, event, cpu);
            handle.enable()?;
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Opens and enables every event, closing whatever was open before.
    /// Never fails: an event that cannot be opened on every target is
    /// released and marked unavailable, and a session with no events at all
    /// settles in [`SessionState::Unsupported`].
    pub fn initialize(&mut self) -> &SessionState {
        self.close();

        let targets = self.targets();
        let mut last_error = None;
        if targets.is_empty() {
            last_error = Some("no CPUs to count on".to_string());
        }

        for event in self.events.clone() {
            if targets.is_empty() {
                self.failed.push(event);
                continue;
            }
            // a failed open or enable drops the handles opened so far
            match self.open_event(event, &targets) {
                Ok(handles) => {
                    self.handles.insert(event, handles);
                }
                Err(error) => {
                    warn!("perf counter {} unavailable: {}", event.name(), error);
                    last_error = Some(error.to_string());
                    self.failed.push(event);
                }
            }
        }

        let requested = self.events.len();
        let opened = self.handles.len();
        self.state = if opened == 0 {
            let reason = last_error.unwrap_or_else(|| "no events requested".to_string());
            warn!("perf counters unsupported: {}", reason);
            SessionState::Unsupported { reason }
        } else {
            info!("perf session live: {} of {} counters opened", opened, requested);
            SessionState::Live { opened, requested }
        };
        &self.state
    }

    /// Reads every open event. An event whose read fails on any handle is
    /// left out of the snapshot for this tick only.
    pub fn read(&mut self) -> PerfReading {
        let mut snapshot = Snapshot::new(Instant::now());
        let mut unavailable = self.failed.clone();

        for (event, handles) in self.handles.iter_mut() {
            let total = handles
                .iter_mut()
                .try_fold(0u64, |sum, handle| Some(sum.saturating_add(handle.read()?)));
            match total {
                Some(total) => snapshot.set_counter(event.name(), total),
                None => unavailable.push(*event),
            }
        }
        unavailable.sort();

        PerfReading {
            snapshot,
            unavailable,
        }
    }

    /// Releases every handle. The session can be initialised again.
    pub fn close(&mut self) {
        self.handles.clear();
        self.failed.clear();
        self.state = SessionState::Uninitialized;
    }
}

impl Drop for PerfCounterSession {
    fn drop(&mut self) {
        self.close();
    }
}

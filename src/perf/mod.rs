mod counter;
mod ffi;
mod session;

use std::io;

use thiserror::Error;

pub use counter::{
    CounterDevice, CounterKind, CounterOpener, KernelCounter, KernelOpener, PerfCounterHandle,
    PerfEvent,
};
pub use session::{PerfCounterSession, PerfReading, SessionState};

#[derive(Debug, Error)]
pub enum PerfError {
    #[error("failed to open {event} on cpu {cpu}: {source}")]
    Open {
        event: &'static str,
        cpu: i32,
        #[source]
        source: io::Error,
    },
    #[error("failed to enable {event}: {source}")]
    Enable {
        event: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("perf events unsupported: {0}")]
    Unsupported(String),
}

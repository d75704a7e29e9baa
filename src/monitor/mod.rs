//! One sampling pass over every domain, the loop that repeats it, and the
//! ways its result is shown.

mod host;
#[allow(clippy::module_inception)]
mod monitor;
mod report;
mod sampler;

pub use host::HostInfo;
pub use monitor::{Monitor, TickReport};
pub use report::{render_json, render_text, TextReport};
pub use sampler::{run_until, shutdown_signal, SamplerHandle};

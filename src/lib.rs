pub mod analysis;
pub mod config;
pub mod metrics;
pub mod monitor;
pub mod perf;
pub mod procfs;

pub use analysis::{Analysis, BottleneckClassifier, CorrelationAnalyzer, HealthState};
pub use config::{MonitorConfig, Thresholds};
pub use monitor::{Monitor, SamplerHandle, TickReport};

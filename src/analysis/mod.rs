//! Turns computed metrics into named conditions and explanations.

mod classifier;
mod correlation;
mod flags;
#[cfg(test)]
mod tests;

pub use classifier::{BottleneckClassifier, MetricsRecord};
pub use correlation::{Analysis, CorrelationAnalyzer, Finding, HealthState};
pub use flags::{BottleneckFlag, Domain, FlagKind, FlagSet};

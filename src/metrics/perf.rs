use serde::Serialize;

use super::delta::{compute_percent, ratio, Deltas};

pub const CYCLES: &str = "cpu_cycles";
pub const INSTRUCTIONS: &str = "instructions";
pub const CACHE_REFERENCES: &str = "cache_references";
pub const CACHE_MISSES: &str = "cache_misses";
pub const BRANCH_INSTRUCTIONS: &str = "branch_instructions";
pub const BRANCH_MISSES: &str = "branch_misses";
pub const CONTEXT_SWITCHES: &str = "context_switches";
pub const PAGE_FAULTS: &str = "page_faults";

/// Derived hardware-counter figures. Every field is `None` when a counter it
/// needs was not available this tick; deltas are kept so callers can tell a
/// real zero from an idle denominator.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PerfMetrics {
    pub cycles: Option<u64>,
    pub instructions: Option<u64>,
    pub cache_references: Option<u64>,
    pub cache_misses: Option<u64>,
    pub branch_instructions: Option<u64>,
    pub branch_misses: Option<u64>,
    pub ipc: Option<f64>,
    pub cache_hit_rate: Option<f64>,
    pub branch_miss_rate: Option<f64>,
    pub context_switch_rate: Option<f64>,
    pub page_fault_rate: Option<f64>,
    /// Counters that could not be opened or read.
    pub unavailable: Vec<String>,
}

/// Instructions per cycle; 0 when no cycles elapsed.
pub fn ipc(instructions: u64, cycles: u64) -> f64 {
    ratio(instructions as f64, cycles as f64)
}

/// Share of cache references that hit; 0 when there were no references.
pub fn cache_hit_rate(references: u64, misses: u64) -> f64 {
    compute_percent(references.saturating_sub(misses) as f64, references as f64)
}

/// Share of branches mispredicted; 0 when there were no branches. Scaled
/// multiplexed counts can overshoot, so the result is capped at 100.
pub fn branch_miss_rate(branches: u64, misses: u64) -> f64 {
    compute_percent(misses as f64, branches as f64).min(100.0)
}

pub fn perf_metrics(deltas: &Deltas, unavailable: Vec<String>) -> PerfMetrics {
    let cycles = deltas.delta(CYCLES);
    let instructions = deltas.delta(INSTRUCTIONS);
    let cache_references = deltas.delta(CACHE_REFERENCES);
    let cache_misses = deltas.delta(CACHE_MISSES);
    let branch_instructions = deltas.delta(BRANCH_INSTRUCTIONS);
    let branch_misses = deltas.delta(BRANCH_MISSES);

    PerfMetrics {
        cycles,
        instructions,
        cache_references,
        cache_misses,
        branch_instructions,
        branch_misses,
        ipc: instructions.zip(cycles).map(|(i, c)| ipc(i, c)),
        cache_hit_rate: cache_references
            .zip(cache_misses)
            .map(|(r, m)| cache_hit_rate(r, m)),
        branch_miss_rate: branch_instructions
            .zip(branch_misses)
            .map(|(b, m)| branch_miss_rate(b, m)),
        context_switch_rate: deltas.rate(CONTEXT_SWITCHES),
        page_fault_rate: deltas.rate(PAGE_FAULTS),
        unavailable,
    }
}

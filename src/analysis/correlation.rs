use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::Thresholds;

use super::flags::{BottleneckFlag, FlagKind, FlagSet};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Healthy,
    AttentionRequired,
}

impl HealthState {
    pub fn label(self) -> &'static str {
        match self {
            HealthState::Healthy => "SYSTEM HEALTHY",
            HealthState::AttentionRequired => "ATTENTION REQUIRED",
        }
    }
}

/// An explanation for one or more flags raised in the same tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    pub explanation: String,
    pub advice: String,
    pub flags: Vec<BottleneckFlag>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Analysis {
    pub health: HealthState,
    pub findings: Vec<Finding>,
}

#[derive(Clone, Debug)]
enum Condition {
    /// Any flag of any of these kinds.
    AnyOf(&'static [FlagKind]),
    /// More than `n` flags of this kind.
    MoreThan(FlagKind, usize),
}

impl Condition {
    fn holds(&self, flags: &FlagSet) -> bool {
        match self {
            Condition::AnyOf(kinds) => kinds.iter().any(|kind| flags.contains(*kind)),
            Condition::MoreThan(kind, n) => flags.count(*kind) > *n,
        }
    }

    fn kinds(&self) -> &[FlagKind] {
        match self {
            Condition::AnyOf(kinds) => kinds,
            Condition::MoreThan(kind, _) => std::slice::from_ref(kind),
        }
    }
}

#[derive(Clone, Debug)]
struct Rule {
    all_of: Vec<Condition>,
    explanation: &'static str,
    advice: &'static str,
}

/// Combines one tick's flags into findings. Rules are evaluated in order;
/// flags no rule consumed are reported one finding per kind.
#[derive(Clone, Debug)]
pub struct CorrelationAnalyzer {
    rules: Vec<Rule>,
}

impl CorrelationAnalyzer {
    pub fn new(thresholds: &Thresholds) -> Self {
        use Condition::*;
        use FlagKind::*;

        let rules = vec![
            Rule {
                all_of: vec![AnyOf(&[IowaitHigh]), AnyOf(&[QueueBottleneck])],
                explanation: "storage is the bottleneck, CPU blocked on I/O",
                advice: "reduce outstanding I/O or move load to faster devices",
            },
            Rule {
                all_of: vec![AnyOf(&[CpuSaturated]), AnyOf(&[CpuBound])],
                explanation: "CPU saturated and inefficient",
                advice: "profile hot code for stalls before adding cores",
            },
            Rule {
                all_of: vec![AnyOf(&[MemoryExhausted]), AnyOf(&[MemoryPressured])],
                explanation: "memory exhausted under pressure",
                advice: "free memory or add capacity before reclaim stalls everything",
            },
            Rule {
                all_of: vec![AnyOf(&[Swapping]), AnyOf(&[HotDevice, IowaitHigh])],
                explanation: "swapping is adding load to storage",
                advice: "add memory or reduce the resident set",
            },
            Rule {
                all_of: vec![AnyOf(&[CacheThrashing]), AnyOf(&[MemoryPressure])],
                explanation: "cache thrashing while memory is short",
                advice: "shrink working sets or add memory",
            },
            Rule {
                all_of: vec![
                    AnyOf(&[WriteBottleneck, DirtyBacklog]),
                    AnyOf(&[QueueBottleneck]),
                ],
                explanation: "dirty page writeback is saturating device queues",
                advice: "tune dirty ratios or spread writes across devices",
            },
            Rule {
                all_of: vec![MoreThan(CpuIntensive, thresholds.process.many_cpu_intensive)],
                explanation: "many CPU-intensive processes are competing",
                advice: "stagger or cap the listed processes",
            },
            Rule {
                all_of: vec![MoreThan(
                    MemoryIntensive,
                    thresholds.process.many_memory_intensive,
                )],
                explanation: "many memory-intensive processes are competing",
                advice: "reduce concurrency of the listed processes",
            },
        ];
        CorrelationAnalyzer { rules }
    }

    pub fn analyze(&self, flags: &FlagSet) -> Analysis {
        let mut findings = Vec::new();
        let mut consumed: BTreeSet<FlagKind> = BTreeSet::new();

        for rule in &self.rules {
            if !rule.all_of.iter().all(|condition| condition.holds(flags)) {
                continue;
            }
            let kinds: BTreeSet<FlagKind> = rule
                .all_of
                .iter()
                .flat_map(|condition| condition.kinds().iter().copied())
                .filter(|kind| flags.contains(*kind))
                .collect();
            findings.push(Finding {
                explanation: rule.explanation.to_string(),
                advice: rule.advice.to_string(),
                flags: flags
                    .iter()
                    .filter(|flag| kinds.contains(&flag.kind))
                    .cloned()
                    .collect(),
            });
            consumed.extend(kinds);
        }

        let leftover: BTreeSet<FlagKind> = flags
            .iter()
            .map(|flag| flag.kind)
            .filter(|kind| !consumed.contains(kind))
            .collect();
        for kind in leftover {
            let (explanation, advice) = kind.explain();
            findings.push(Finding {
                explanation: explanation.to_string(),
                advice: advice.to_string(),
                flags: flags.of_kind(kind).cloned().collect(),
            });
        }

        let health = if flags.is_empty() {
            HealthState::Healthy
        } else {
            HealthState::AttentionRequired
        };
        Analysis { health, findings }
    }
}

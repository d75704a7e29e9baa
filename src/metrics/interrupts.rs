use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::procfs::{InterruptLine, ProcFs};

use super::delta::DeltaEngine;
use super::source::SourceState;
use super::types::{KeyedSnapshots, Metrics, SampleEnvelope, Snapshot, Unavailable};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InterruptRate {
    pub name: String,
    pub rate: f64,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InterruptMetrics {
    pub total_rate: f64,
    /// Busiest lines, highest rate first.
    pub top: Vec<InterruptRate>,
}

#[derive(Clone, Debug, Default)]
pub struct InterruptTable {
    pub snapshots: KeyedSnapshots<String>,
    pub descriptions: BTreeMap<String, String>,
}

pub fn interrupt_table(lines: &[InterruptLine], at: Instant) -> InterruptTable {
    let mut table = InterruptTable::default();
    for line in lines {
        table
            .snapshots
            .insert(line.name.clone(), Snapshot::new(at).with_counter("count", line.total));
        table
            .descriptions
            .insert(line.name.clone(), line.description.clone());
    }
    table
}

/// Named lines (`NMI`, `LOC`, ...) are described from `known`; numbered
/// lines fall back to the chip/handler text from the file.
pub fn describe_interrupt(
    name: &str,
    from_file: Option<&String>,
    known: &BTreeMap<String, String>,
) -> String {
    known
        .get(name)
        .or(from_file)
        .cloned()
        .unwrap_or_default()
}

pub fn collect_interrupt_sample(
    procfs: &ProcFs,
    descriptions: &BTreeMap<String, String>,
    top_n: usize,
    state: &mut SourceState<InterruptTable>,
    valid_for: Duration,
) -> SampleEnvelope<InterruptMetrics> {
    let started = Instant::now();
    let reading = procfs
        .read_interrupts()
        .map(|lines| interrupt_table(&lines, Instant::now()));

    state.collect(started, valid_for, reading, |ring| {
        let Some(current) = ring.current() else {
            return Metrics::Unavailable(Unavailable::FirstSample);
        };
        DeltaEngine::diff_keyed(ring.previous().map(|table| &table.snapshots), &current.snapshots)
            .map(|per_line| {
                let mut rates: Vec<InterruptRate> = per_line
                    .into_iter()
                    .filter_map(|(name, deltas)| {
                        let rate = deltas.ready()?.rate("count")?;
                        let description = describe_interrupt(
                            &name,
                            current.descriptions.get(&name),
                            descriptions,
                        );
                        Some(InterruptRate {
                            name,
                            rate,
                            description,
                        })
                    })
                    .collect();
                let total_rate = rates.iter().map(|line| line.rate).sum();
                rates.sort_by(|a, b| {
                    b.rate
                        .partial_cmp(&a.rate)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.name.cmp(&b.name))
                });
                rates.truncate(top_n);
                InterruptMetrics {
                    total_rate,
                    top: rates,
                }
            })
    })
}

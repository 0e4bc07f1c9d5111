//! Per-scheme failure counters.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::fault_class::FaultClass;

/// What happened to a failure candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Event {
    /// Fixed by the ECC.
    Corrected,
    /// Detected but not fixed.
    Uncorrected,
    /// Neither fixed nor detected.
    Undetected,
    /// Fixed by the additional redundancy of tiered repair.
    TierProtected,
    /// Masked by the software running on protected memory.
    SoftwareTolerated,
    /// Masked by the software running on memory without additional redundancy.
    UnprotectedSoftwareTolerated,
}

/// One line of the counters table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CounterRow {
    /// Class of the failure footprint.
    pub class: FaultClass,
    /// Number of chips involved.
    pub chips: usize,
    /// Event kind.
    pub event: Event,
    /// Number of occurrences.
    pub count: u64,
}

/// Event counts keyed by fault class, number of chips involved and event kind.
#[derive(Clone, Debug, Default)]
pub struct FailureCounters {
    counts: BTreeMap<(FaultClass, usize, Event), u64>,
}

impl FailureCounters {
    /// Counts one event.
    pub fn record(&mut self, class: FaultClass, chips: usize, event: Event) {
        *self.counts.entry((class, chips, event)).or_default() += 1;
    }

    /// Number of events with the given key.
    pub fn get(&self, class: FaultClass, chips: usize, event: Event) -> u64 {
        self.counts.get(&(class, chips, event)).copied().unwrap_or(0)
    }

    /// Number of events of the given kind, whatever the class and the number of chips.
    pub fn total(&self, event: Event) -> u64 {
        self.counts
            .iter()
            .filter(|((_, _, e), _)| *e == event)
            .map(|(_, count)| count)
            .sum()
    }

    /// Rows sorted by class, number of chips and event, suitable for CSV or table output.
    pub fn rows(&self) -> Vec<CounterRow> {
        self.counts
            .iter()
            .map(|(&(class, chips, event), &count)| CounterRow {
                class,
                chips,
                event,
                count,
            })
            .collect()
    }
}

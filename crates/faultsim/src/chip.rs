//! Leaf domain holding the faults of one DRAM chip.

use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde_json::json;

use crate::codec::AddressCodec;
use crate::fault_class::FaultClass;
use crate::range::{ChipId, Contributor, FaultRange, RangeRef, Slot};
use crate::repair::{Failures, FaultCount, RepairScheme};
use crate::{log_debug, log_trace};

/// One memory chip.
///
/// The chip owns the faults injected into it. Its optional repair schemes (on-die ECC) may hide some of these faults
/// from the rest of the module and expose residual ranges instead; the residuals stay owned by the schemes.
pub struct ChipDomain {
    id: ChipId,
    name: String,
    codec: AddressCodec,
    faults: Vec<FaultRange>,
    absorbed: Vec<bool>,
    schemes: Vec<Box<dyn RepairScheme<ChipDomain>>>,
    count: FaultCount,
    rng: Pcg64,
}

impl ChipDomain {
    /// Creates a chip without faults.
    pub fn new(id: ChipId, name: &str, codec: AddressCodec, seed: u64) -> Self {
        Self {
            id,
            name: name.to_string(),
            codec,
            faults: Vec::new(),
            absorbed: Vec::new(),
            schemes: Vec::new(),
            count: FaultCount::default(),
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Chip identifier.
    pub fn id(&self) -> ChipId {
        self.id
    }

    /// Chip name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address layout of the chip.
    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    /// Attaches an on-die repair scheme.
    pub fn add_scheme(&mut self, scheme: Box<dyn RepairScheme<ChipDomain>>) {
        self.schemes.push(scheme);
    }

    /// On-die repair schemes.
    pub fn schemes(&self) -> &[Box<dyn RepairScheme<ChipDomain>>] {
        &self.schemes
    }

    /// Injected faults, including the ones hidden by on-die repair.
    pub fn faults(&self) -> &[FaultRange] {
        &self.faults
    }

    /// Adds a fault to the chip.
    pub fn insert_fault(&mut self, mut fault: FaultRange) {
        debug_assert_eq!(fault.addr & fault.mask, 0, "address bits set under the wildcard mask");
        fault.chip = self.id;
        if fault.transient {
            self.count.transient += 1;
        } else {
            self.count.permanent += 1;
        }
        log_trace!(self, "inserted fault {}", self.codec.describe(fault.addr, fault.mask));
        self.faults.push(fault);
        self.absorbed.push(false);
    }

    /// Generates a random fault of the given class with the chip's generator and inserts it.
    pub fn generate_fault(&mut self, class: FaultClass, transient: bool) -> &FaultRange {
        let fault = self.codec.random_range(self.id, class, transient, &mut self.rng);
        self.insert_fault(fault);
        &self.faults[self.faults.len() - 1]
    }

    /// Number of faults injected during the current run.
    pub fn fault_count(&self) -> FaultCount {
        self.count
    }

    /// Hides a raw fault corrected by an on-die scheme.
    pub fn absorb(&mut self, index: usize) {
        self.absorbed[index] = true;
    }

    /// Ranges visible outside of the chip: raw faults not hidden by on-die repair, then the residuals of every
    /// on-die scheme.
    pub fn ranges(&self) -> Vec<(Slot, &FaultRange)> {
        let raw = self
            .faults
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.absorbed[*i])
            .map(|(i, fault)| (Slot::Raw(i), fault));
        let materialized = self.schemes.iter().enumerate().flat_map(|(scheme, s)| {
            s.materialized()
                .iter()
                .enumerate()
                .map(move |(index, residual)| (Slot::Materialized { scheme, index }, &residual.range))
        });
        raw.chain(materialized).collect()
    }

    /// Snapshots of the visible ranges, as used by the intersection search.
    pub fn contributors(&self) -> Vec<Contributor> {
        self.ranges()
            .into_iter()
            .map(|(slot, range)| Contributor::new(RangeRef { chip: self.id, slot }, range))
            .collect()
    }

    /// Marks a visible range as part of a counted failure.
    ///
    /// Residual ranges are recomputed on every repair, so the mark goes to the raw faults they come from.
    pub fn mark_uncorrectable(&mut self, slot: Slot) {
        match slot {
            Slot::Raw(index) => self.faults[index].mark_uncorrectable(),
            Slot::Materialized { scheme, index } => {
                let sources: Vec<usize> = self.schemes[scheme].materialized()[index]
                    .contributors
                    .iter()
                    .filter(|c| c.at.chip == self.id)
                    .filter_map(|c| match c.at.slot {
                        Slot::Raw(i) => Some(i),
                        Slot::Materialized { .. } => None,
                    })
                    .collect();
                for i in sources {
                    self.faults[i].mark_uncorrectable();
                }
            }
        }
    }

    /// Applies the on-die schemes.
    ///
    /// Without any scheme every injected fault counts as both undetected and uncorrected. Otherwise the smallest
    /// result among the schemes is returned.
    pub fn repair(&mut self) -> Failures {
        self.absorbed.iter_mut().for_each(|a| *a = false);
        let raw = self.count.total();
        if self.schemes.is_empty() {
            return Failures::new(raw, raw);
        }

        let mut schemes = std::mem::take(&mut self.schemes);
        let mut result = Failures::new(raw, raw);
        for scheme in schemes.iter_mut() {
            let after = scheme.repair(self);
            if !self.faults.is_empty() {
                log_debug!(self, "{}", json!({"scheme": scheme.name(), "faults": raw, "after": after}));
            }
            result = result.min(after);
        }
        self.schemes = schemes;
        result
    }

    /// Removes transient faults that did not take part in a counted failure.
    pub fn scrub(&mut self) {
        let before = self.faults.len();
        self.faults.retain(|fault| !fault.scrub_candidate());
        self.absorbed = vec![false; self.faults.len()];
        for scheme in self.schemes.iter_mut() {
            scheme.reset();
        }
        if self.faults.len() != before {
            log_debug!(self, "scrubbed {} transient faults", before - self.faults.len());
        }
    }

    /// Removes all faults and the state of on-die schemes.
    pub fn reset(&mut self) {
        self.faults.clear();
        self.absorbed.clear();
        self.count = FaultCount::default();
        for scheme in self.schemes.iter_mut() {
            scheme.reset();
        }
    }

    /// Logs the visible ranges.
    pub fn dump_state(&self) {
        for (slot, range) in self.ranges() {
            log_trace!(
                self,
                "{:?} {} transient {} uncorrectable {}",
                slot,
                self.codec.describe(range.addr, range.mask),
                range.transient,
                range.is_uncorrectable()
            );
        }
    }
}

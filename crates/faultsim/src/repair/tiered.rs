//! Tiered ECC (VECC): ChipKill with additional redundant symbols stored in another rank, backed by software
//! tolerance.
//!
//! For a fraction of DRAM rows, `n_additional` extra symbols per ECC word are kept in a chunk of another rank. A
//! failure whose rows are all protected, and whose redundant chunks are fault-free, gets `n_additional` more
//! correctable symbols. Remaining detected failures may still be tolerated by software, with a probability that
//! depends on the fault class and on whether the memory was protected.

use std::collections::HashMap;

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::codec::{AddressCodec, Field};
use crate::error::{check_probability, Error, Result};
use crate::fault_class::FaultClass;
use crate::group::GroupDomain;
use crate::log_debug;
use crate::range::{ranges_intersect, ChipId, Contributor, FaultIntersection};
use crate::repair::dedup::Deduplication;
use crate::repair::stats::{Event, FailureCounters};
use crate::repair::symbol::SymbolRepair;
use crate::repair::{Failures, RepairScheme};

/// Second-tier status of a failure, ordered from the most favorable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Protection {
    Protected,
    RedundancyFaulted,
    Unprotected,
    Ineligible,
}

/// VECC repair scheme.
pub struct TieredRepair {
    symbol: SymbolRepair,
    n_additional: usize,
    protected_fraction: f64,
    sw_tolerance: Vec<f64>,
    unprotected_sw_tolerance: Vec<f64>,
    rng: Pcg64,
    counters: FailureCounters,
    total_failures: u64,
    tier_tolerated: u64,
}

fn check_table(table: &[f64]) -> Result<()> {
    if table.len() != FaultClass::COUNT {
        return Err(Error::ToleranceTableLength {
            expected: FaultClass::COUNT,
            found: table.len(),
        });
    }
    for p in table.iter() {
        check_probability(*p)?;
    }
    Ok(())
}

impl TieredRepair {
    /// Creates the scheme without software tolerance.
    ///
    /// Chips must have at least two ranks, since redundant symbols live in the rank following the protected row.
    pub fn new(symbol: SymbolRepair, n_additional: usize, protected_fraction: f64, seed: u64) -> Result<Self> {
        check_probability(protected_fraction)?;
        if symbol.codec().num(Field::Rank) < 2 {
            return Err(Error::TooFewRanks);
        }
        Ok(Self {
            symbol,
            n_additional,
            protected_fraction,
            sw_tolerance: vec![0.; FaultClass::COUNT],
            unprotected_sw_tolerance: vec![0.; FaultClass::COUNT],
            rng: Pcg64::seed_from_u64(seed),
            counters: FailureCounters::default(),
            total_failures: 0,
            tier_tolerated: 0,
        })
    }

    /// Sets the probabilities, indexed by fault class, that software tolerates a detected failure in protected and
    /// in unprotected memory.
    pub fn with_software_tolerance(mut self, protected: Vec<f64>, unprotected: Vec<f64>) -> Result<Self> {
        check_table(&protected)?;
        check_table(&unprotected)?;
        self.sw_tolerance = protected;
        self.unprotected_sw_tolerance = unprotected;
        Ok(self)
    }

    /// Fraction of failure candidates fixed by the second tier.
    pub fn tolerated_fraction(&self) -> f64 {
        if self.total_failures == 0 {
            0.
        } else {
            self.tier_tolerated as f64 / self.total_failures as f64
        }
    }

    fn codec(&self) -> &AddressCodec {
        self.symbol.codec()
    }

    /// Decides whether the redundant symbols of a row are available.
    fn roll_row(&mut self, codec: &AddressCodec, row: u64, chunk_mask: u64, ranges: &[Contributor]) -> Protection {
        if self.rng.gen::<f64>() >= self.protected_fraction {
            return Protection::Unprotected;
        }
        let ranks = codec.num(Field::Rank);
        let rank = codec.get(Field::Rank, row);
        let mut location = codec.random_range(ChipId::default(), FaultClass::Bit, true, &mut self.rng);
        codec.put(Field::Rank, &mut location.addr, (rank + 1) % ranks);
        location.addr &= !chunk_mask;
        location.mask |= chunk_mask;

        let faulted = ranges
            .iter()
            .any(|c| ranges_intersect(c.addr, c.mask, location.addr, location.mask));
        if faulted {
            Protection::RedundancyFaulted
        } else {
            Protection::Protected
        }
    }

    /// Applies the second tier, raising the offset of every failure it fixes.
    fn tier_tolerate(&mut self, failures: &mut [FaultIntersection], ranges: &[Contributor]) -> Vec<Protection> {
        let codec = self.codec().clone();
        let row_size = 1u64 << codec.field_shift(Field::Row);
        // 1 tolerated symbol needs 2 stored symbols, for every 64-byte word of the row
        let chunk_mask = (row_size.saturating_mul(2 * self.n_additional as u64) / 64).max(1) - 1;
        let max_chips = self.symbol.n_correct() + self.n_additional;

        let mut rows: HashMap<u64, Protection> = HashMap::new();
        let mut result = Vec::with_capacity(failures.len());
        for failure in failures.iter_mut() {
            if codec.mask_class(failure.mask()) >= FaultClass::MultiBank || failure.chip_count() > max_chips {
                result.push(Protection::Ineligible);
                continue;
            }

            let base = codec.with(Field::Bit, codec.with(Field::Column, failure.addr(), 0), 0);
            let row_values = if codec.is_wild(Field::Row, failure.mask()) {
                0..codec.num(Field::Row)
            } else {
                let row = codec.get(Field::Row, base);
                row..row + 1
            };
            let mut protection = Protection::Protected;
            for value in row_values {
                let row = codec.with(Field::Row, base, value);
                let state = match rows.get(&row) {
                    Some(state) => *state,
                    None => {
                        let state = self.roll_row(&codec, row, chunk_mask, ranges);
                        rows.insert(row, state);
                        state
                    }
                };
                protection = protection.max(state);
            }
            if protection == Protection::Protected {
                failure.offset += self.n_additional;
            }
            result.push(protection);
        }
        result
    }

    /// Drops the failures tolerated by software.
    fn software_tolerate(
        &mut self,
        failures: Vec<FaultIntersection>,
        protection: &HashMap<(u64, u64), Protection>,
    ) -> Vec<FaultIntersection> {
        let mut kept = Vec::with_capacity(failures.len());
        for failure in failures {
            let class = self.codec().mask_class(failure.mask());
            let unprotected = protection.get(&(failure.addr(), failure.mask())) == Some(&Protection::Unprotected);
            let (p, event) = if unprotected {
                (
                    self.unprotected_sw_tolerance[class.index()],
                    Event::UnprotectedSoftwareTolerated,
                )
            } else {
                (self.sw_tolerance[class.index()], Event::SoftwareTolerated)
            };
            if self.rng.gen::<f64>() < p {
                self.counters.record(class, failure.chip_count(), event);
            } else {
                kept.push(failure);
            }
        }
        kept
    }
}

impl RepairScheme<GroupDomain> for TieredRepair {
    fn name(&self) -> &str {
        self.symbol.name()
    }

    fn repair(&mut self, domain: &mut GroupDomain) -> Failures {
        let n_correct = self.symbol.n_correct();
        let n_detect = self.symbol.n_detect();
        let bound = n_detect.max(n_correct + self.n_additional);
        let mut failures = self.symbol.failures(domain, bound);
        let ranges: Vec<Contributor> = domain.visible_ranges().into_iter().flatten().collect();
        let tiers = self.tier_tolerate(&mut failures, &ranges);

        let mut protection = HashMap::new();
        let mut sdc = Vec::new();
        let mut due = Vec::new();
        let total = failures.len() as u64;
        for (failure, tier) in failures.into_iter().zip(tiers) {
            protection.entry((failure.addr(), failure.mask())).or_insert(tier);
            let chips = failure.chip_count();
            let effective = chips.saturating_sub(failure.offset);
            if effective > n_detect {
                sdc.push(failure);
            } else if effective > n_correct {
                due.push(failure);
            } else {
                let class = self.codec().mask_class(failure.mask());
                self.counters.record(class, chips, Event::TierProtected);
            }
        }
        self.total_failures += total;
        self.tier_tolerated += total - sdc.len() as u64 - due.len() as u64;

        let dedup = Deduplication::new(self.symbol.name(), self.symbol.codec());
        let sdc = dedup.run(sdc);
        let due = dedup.run(due);
        let due = self.software_tolerate(due, &protection);

        let result = Failures::new(sdc.len() as u64, due.len() as u64);
        for mut failure in due {
            failure.mark_uncorrectable();
            let class = self.codec().mask_class(failure.mask());
            self.counters.record(class, failure.chip_count(), Event::Uncorrected);
            domain.mark_uncorrectable(&failure);
        }
        for mut failure in sdc {
            failure.mark_undetected();
            let class = self.codec().mask_class(failure.mask());
            self.counters.record(class, failure.chip_count(), Event::Undetected);
            domain.mark_uncorrectable(&failure);
        }
        if result.any() {
            log_debug!(self, "{} after tiered repair of {} candidates", result, total);
        }
        result
    }

    fn counters(&self) -> &FailureCounters {
        &self.counters
    }
}

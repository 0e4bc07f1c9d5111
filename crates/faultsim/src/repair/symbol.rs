//! Symbol-based ECC (ChipKill).

use serde_json::json;

use crate::codec::AddressCodec;
use crate::error::{Error, Result};
use crate::group::GroupDomain;
use crate::intersection::IntersectionEngine;
use crate::log_debug;
use crate::range::FaultIntersection;
use crate::repair::dedup::Deduplication;
use crate::repair::stats::{Event, FailureCounters};
use crate::repair::{Failures, RepairScheme};

/// Default symbol size, 8 bits.
pub const DEFAULT_LOG_SYMBOL_SIZE: u32 = 3;

/// Corrects up to `n_correct` and detects up to `n_detect` failing symbols per ECC word, each symbol coming from a
/// different chip.
pub struct SymbolRepair {
    name: String,
    n_correct: usize,
    n_detect: usize,
    log_symbol_size: u32,
    codec: AddressCodec,
    counters: FailureCounters,
}

impl SymbolRepair {
    /// Creates the scheme for chips with the given layout.
    pub fn new(name: &str, n_correct: usize, n_detect: usize, codec: AddressCodec) -> Result<Self> {
        if n_detect < n_correct {
            return Err(Error::DetectBelowCorrect {
                correct: n_correct,
                detect: n_detect,
            });
        }
        Ok(Self {
            name: name.to_string(),
            n_correct,
            n_detect,
            log_symbol_size: DEFAULT_LOG_SYMBOL_SIZE,
            codec,
            counters: FailureCounters::default(),
        })
    }

    /// Sets the symbol size to `2^log_symbol_size` bits.
    ///
    /// The symbol must span less than the 64 address bits.
    pub fn with_symbol_size(mut self, log_symbol_size: u32) -> Result<Self> {
        if log_symbol_size >= u64::BITS {
            return Err(Error::InvalidSymbolSize(log_symbol_size));
        }
        self.log_symbol_size = log_symbol_size;
        Ok(self)
    }

    /// Number of correctable symbols.
    pub fn n_correct(&self) -> usize {
        self.n_correct
    }

    /// Number of detectable symbols.
    pub fn n_detect(&self) -> usize {
        self.n_detect
    }

    /// Address bits spanned by one symbol.
    pub fn symbol_mask(&self) -> u64 {
        (1u64 << self.log_symbol_size) - 1
    }

    /// Chip address layout.
    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    /// Intersections involving more chips than the scheme corrects, before deduplication.
    ///
    /// The search stops extending intersections once they cover more than `bound` chips.
    pub fn failures(&self, domain: &mut GroupDomain, bound: usize) -> Vec<FaultIntersection> {
        let n_correct = self.n_correct;
        let engine = IntersectionEngine::new(self.symbol_mask(), bound);
        domain.intersecting_ranges(engine, move |f| f.chip_count() > n_correct)
    }
}

impl RepairScheme<GroupDomain> for SymbolRepair {
    fn name(&self) -> &str {
        &self.name
    }

    fn repair(&mut self, domain: &mut GroupDomain) -> Failures {
        let failures = self.failures(domain, self.n_detect);
        let failures = Deduplication::new(&self.name, &self.codec).run(failures);

        let mut result = Failures::default();
        for mut failure in failures {
            let class = self.codec.mask_class(failure.mask());
            let chips = failure.chip_count();
            if chips > self.n_detect {
                failure.mark_undetected();
                self.counters.record(class, chips, Event::Undetected);
                result.undetected += 1;
            } else {
                failure.mark_uncorrectable();
                self.counters.record(class, chips, Event::Uncorrected);
                result.uncorrected += 1;
            }
            log_debug!(
                self,
                "{}",
                json!({"class": class, "chips": chips, "outcome": failure.outcome,
                       "range": self.codec.describe(failure.addr(), failure.mask())})
            );
            domain.mark_uncorrectable(&failure);
        }
        result
    }

    fn counters(&self) -> &FailureCounters {
        &self.counters
    }
}

//! Bit-based BCH codes: SECDED, 3EC4ED and 6EC7ED.

use crate::codec::AddressCodec;
use crate::error::{Error, Result};
use crate::group::GroupDomain;
use crate::intersection::IntersectionEngine;
use crate::log_debug;
use crate::repair::dedup::Deduplication;
use crate::repair::stats::{Event, FailureCounters};
use crate::repair::{Failures, RepairScheme};

/// Corrects up to `n_correct` and detects up to `n_detect` wrong bits per ECC word.
///
/// The ECC word size is tied to the code: SECDED is computed over 8 bytes (4 locations per chip), 3EC4ED over
/// 32 bytes (16 locations) and 6EC7ED over 64 bytes (32 locations).
pub struct BitRepair {
    name: String,
    n_correct: usize,
    n_detect: usize,
    word_bits: u32,
    codec: AddressCodec,
    counters: FailureCounters,
}

impl BitRepair {
    /// Creates the code, failing for anything but the three supported variants.
    pub fn new(name: &str, n_correct: usize, n_detect: usize, codec: AddressCodec) -> Result<Self> {
        let word_bits = match n_correct {
            1 => 2,
            3 => 4,
            6 => 5,
            _ => 0,
        };
        if word_bits == 0 || n_detect != n_correct + 1 {
            return Err(Error::UnsupportedBch {
                correct: n_correct,
                detect: n_detect,
            });
        }
        Ok(Self {
            name: name.to_string(),
            n_correct,
            n_detect,
            word_bits,
            codec,
            counters: FailureCounters::default(),
        })
    }

    /// Address bits spanned by one ECC word.
    pub fn word_mask(&self) -> u64 {
        (1u64 << self.word_bits) - 1
    }
}

impl RepairScheme<GroupDomain> for BitRepair {
    fn name(&self) -> &str {
        &self.name
    }

    fn repair(&mut self, domain: &mut GroupDomain) -> Failures {
        let word_mask = self.word_mask();
        let n_correct = self.n_correct;
        // a frontier over n_detect chips has more than n_detect wrong bits
        let engine = IntersectionEngine::new(word_mask, self.n_detect);
        let failures = domain.intersecting_ranges(engine, move |f| f.bit_count_sum(word_mask) > n_correct);
        let failures = Deduplication::new(&self.name, &self.codec).run(failures);

        let mut result = Failures::default();
        for mut failure in failures {
            let class = self.codec.mask_class(failure.mask());
            let chips = failure.chip_count();
            let bits = failure.bit_count_sum(word_mask);
            if bits > self.n_detect {
                failure.mark_undetected();
                self.counters.record(class, chips, Event::Undetected);
                result.undetected += 1;
            } else {
                failure.mark_uncorrectable();
                self.counters.record(class, chips, Event::Uncorrected);
                result.uncorrected += 1;
            }
            domain.mark_uncorrectable(&failure);
        }
        if result.any() {
            log_debug!(self, "failed words: {}", result);
        }
        result
    }

    fn counters(&self) -> &FailureCounters {
        &self.counters
    }
}

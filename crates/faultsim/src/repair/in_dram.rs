//! On-die BCH code applied inside every chip.
//!
//! Each DRAM row is split into codewords of `codeword` bits holding `dataword` data bits. Faults up to the column
//! class are corrected in place when their codeword has at most `n_correct` wrong bits. Codewords with more wrong
//! bits are replaced by residual ranges expressed in the post-correction address space, where every codeword
//! occupies `dataword / bus_bits` columns. Coarser faults are left for module-level ECC.

use std::collections::{BTreeMap, BTreeSet};

use crate::chip::ChipDomain;
use crate::codec::{AddressCodec, Field};
use crate::error::{Error, Result};
use crate::fault_class::FaultClass;
use crate::log_trace;
use crate::range::{FaultIntersection, RangeRef, Slot};
use crate::repair::stats::{Event, FailureCounters};
use crate::repair::{Failures, RepairScheme};

/// In-DRAM ECC scheme of one chip.
pub struct InDramRepair {
    name: String,
    dataword: u32,
    n_correct: usize,
    codeword_cols_in: u32,
    codeword_cols_out: u32,
    residuals: Vec<FaultIntersection>,
    counters: FailureCounters,
}

impl InDramRepair {
    /// Creates a (codeword, dataword) code for chips with the given layout.
    ///
    /// The code works over `GF(2^m)` with `m = 1 + round(log2(dataword))` and corrects one bit per `m` parity bits.
    pub fn new(name: &str, codeword: u32, dataword: u32, codec: &AddressCodec) -> Result<Self> {
        let invalid = Error::InvalidInDramCode { codeword, dataword };
        if dataword == 0 || codeword <= dataword {
            return Err(invalid);
        }
        let extra = codeword - dataword;
        let element = 1 + (dataword as f64).log2().round() as u32;
        let parity = extra % element;
        if parity > 1 || codeword as u64 >= (1u64 << element) - 1 {
            return Err(invalid);
        }
        if parity == 1 {
            return Err(Error::InDramDetectionUnsupported);
        }

        let bits = codec.num(Field::Bit);
        let cols = codec.num(Field::Column);
        if (cols as u64 * bits as u64) % codeword as u64 != 0 {
            return Err(Error::InDramGeometry(format!(
                "{} columns of {} bits do not hold whole {}-bit codewords",
                cols, bits, codeword
            )));
        }
        if codeword % bits != 0 || dataword % bits != 0 {
            return Err(Error::InDramGeometry(format!(
                "codeword ({}, {}) is not made of whole {}-bit columns",
                codeword, dataword, bits
            )));
        }
        if !dataword.is_power_of_two() || !bits.is_power_of_two() {
            return Err(Error::InDramGeometry(format!(
                "dataword {} and bus width {} must be powers of two",
                dataword, bits
            )));
        }

        Ok(Self {
            name: name.to_string(),
            dataword,
            n_correct: (extra / element) as usize,
            codeword_cols_in: codeword / bits,
            codeword_cols_out: dataword / bits,
            residuals: Vec::new(),
            counters: FailureCounters::default(),
        })
    }

    /// Number of bits corrected per codeword.
    pub fn n_correct(&self) -> usize {
        self.n_correct
    }

    /// Number of columns of a codeword before correction.
    pub fn codeword_cols(&self) -> u32 {
        self.codeword_cols_in
    }

    fn record(&mut self, codec: &AddressCodec, error: &FaultIntersection, event: Event) {
        self.counters
            .record(codec.mask_class(error.mask()), error.contributors.len(), event);
    }

    /// Checks one codeword, keeping a residual range if it has too many wrong bits.
    fn check(&mut self, codec: &AddressCodec, error: &FaultIntersection) -> bool {
        if error.bit_count_aggregate(codec, self.codeword_cols_in) > self.n_correct {
            self.record(codec, error, Event::Uncorrected);
            self.residuals.push(error.clone());
            false
        } else {
            self.record(codec, error, Event::Corrected);
            true
        }
    }
}

impl RepairScheme<ChipDomain> for InDramRepair {
    fn name(&self) -> &str {
        &self.name
    }

    fn repair(&mut self, chip: &mut ChipDomain) -> Failures {
        self.residuals.clear();
        let codec = chip.codec().clone();
        let data_mask = self.dataword as u64 - 1;

        // bucket faults up to the column class per (rank, bank)
        let mut banks: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (i, fault) in chip.faults().iter().enumerate() {
            if codec.mask_class(fault.mask) > FaultClass::Column {
                continue;
            }
            let bank = [Field::Row, Field::Column, Field::Bit]
                .iter()
                .fold(fault.addr, |addr, field| codec.with(*field, addr, 0));
            banks.entry(bank).or_default().push(i);
        }

        let mut absorbed = Vec::new();
        for indices in banks.into_values() {
            let mut columns: BTreeMap<u32, FaultIntersection> = BTreeMap::new();
            let mut words: BTreeMap<(u32, u32), FaultIntersection> = BTreeMap::new();
            for i in indices {
                let fault = &chip.faults()[i];
                let codeword = codec.get(Field::Column, fault.addr) / self.codeword_cols_in;
                let at = RangeRef {
                    chip: chip.id(),
                    slot: Slot::Raw(i),
                };
                let mut error = FaultIntersection::from_range(at, fault, data_mask);
                codec.put(Field::Column, &mut error.range.addr, codeword * self.codeword_cols_out);

                let target = if codec.is_wild(Field::Row, fault.mask) {
                    columns.entry(codeword).or_insert_with(FaultIntersection::identity)
                } else {
                    let row = codec.get(Field::Row, fault.addr);
                    words.entry((codeword, row)).or_insert_with(FaultIntersection::identity)
                };
                target.combine(&error);
                absorbed.push(i);
            }

            let mut failed_columns = BTreeSet::new();
            for (codeword, column) in columns.iter() {
                if !self.check(&codec, column) {
                    failed_columns.insert(*codeword);
                }
            }
            for ((codeword, _), mut word) in words {
                if failed_columns.contains(&codeword) {
                    continue;
                }
                if let Some(column) = columns.get(&codeword) {
                    word.combine(column);
                }
                self.check(&codec, &word);
            }
        }

        for i in absorbed {
            chip.absorb(i);
        }
        let visible = chip.ranges().len() + self.residuals.len();
        log_trace!(self, "{} residual codewords, {} visible ranges", self.residuals.len(), visible);
        Failures::new(visible as u64, visible as u64)
    }

    fn reset(&mut self) {
        self.residuals.clear();
    }

    fn counters(&self) -> &FailureCounters {
        &self.counters
    }

    fn materialized(&self) -> &[FaultIntersection] {
        &self.residuals
    }
}

//! Fault ranges and their intersections.

use serde::Serialize;

use crate::codec::{AddressCodec, Field};

/// Identifier of a chip domain, unique inside a module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChipId(pub u32);

/// Checks whether two `(address, mask)` pairs share at least one location.
///
/// Every bit position that is not wildcarded in either mask must carry the same address bit.
pub fn ranges_intersect(addr0: u64, mask0: u64, addr1: u64, mask1: u64) -> bool {
    !(mask0 | mask1 | !(addr0 ^ addr1)) == 0
}

fn location_bound(mask: u64) -> u64 {
    1u64.checked_shl(mask.count_ones()).unwrap_or(u64::MAX)
}

/// A set of faulty locations of one chip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultRange {
    /// Address of the fixed fields, zero in every wildcarded bit.
    pub addr: u64,
    /// Wildcard mask, a set bit matches any address bit.
    pub mask: u64,
    /// Transient faults disappear on scrub.
    pub transient: bool,
    /// Chip the fault belongs to.
    pub chip: ChipId,
    /// Number of physical locations covered.
    ///
    /// Exact (the product of the wildcarded field sizes) for ranges built by [`AddressCodec::range`]. Ranges built
    /// from a raw mask, widened or combined only know the mask, so they hold the upper bound `2^popcount(mask)`,
    /// which exceeds the exact count when a field size is not a power of two.
    pub max_faults: u64,
    scrubbable: bool,
}

impl FaultRange {
    /// Creates a range, bounding the number of covered locations by `2^popcount(mask)`.
    pub fn new(chip: ChipId, addr: u64, mask: u64, transient: bool) -> Self {
        debug_assert_eq!(addr & mask, 0, "address bits set under the wildcard mask");
        Self {
            addr,
            mask,
            transient,
            chip,
            max_faults: location_bound(mask),
            scrubbable: true,
        }
    }

    /// The range matching every address.
    pub fn identity() -> Self {
        Self::new(ChipId::default(), 0, u64::MAX, false)
    }

    /// Checks whether the ranges share at least one location.
    pub fn intersects(&self, other: &FaultRange) -> bool {
        ranges_intersect(self.addr, self.mask, other.addr, other.mask)
    }

    /// Returns a copy widened to the given granularity.
    pub fn widened(&self, granularity: u64) -> Self {
        let mut range = self.clone();
        if granularity & !self.mask != 0 {
            range.addr &= !granularity;
            range.mask |= granularity;
            range.max_faults = location_bound(range.mask);
        }
        range
    }

    /// Lowest address of the range.
    pub fn start(&self) -> u64 {
        self.addr
    }

    /// Highest address of the range.
    pub fn end(&self) -> u64 {
        self.addr | self.mask
    }

    /// Keeps the range through scrubs, since it already caused a counted failure.
    pub fn mark_uncorrectable(&mut self) {
        self.scrubbable = false;
    }

    /// Returns whether the range has contributed to a counted failure.
    pub fn is_uncorrectable(&self) -> bool {
        !self.scrubbable
    }

    /// Returns whether a scrub removes the range.
    pub fn scrub_candidate(&self) -> bool {
        self.transient && self.scrubbable
    }
}

/// Position of a range inside its chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// Injected fault, indexed in the chip's fault list.
    Raw(usize),
    /// Range materialized by the chip's repair scheme.
    Materialized {
        /// Index of the scheme in the chip.
        scheme: usize,
        /// Index of the range in the scheme's output.
        index: usize,
    },
}

/// Non-owning reference to a fault range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeRef {
    /// Chip holding the range.
    pub chip: ChipId,
    /// Position inside the chip.
    pub slot: Slot,
}

/// A range taking part in an intersection, as it was at the time of the search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contributor {
    /// Where the range lives.
    pub at: RangeRef,
    /// Range address.
    pub addr: u64,
    /// Range mask, not widened by the search granularity.
    pub mask: u64,
    /// Whether the range is transient.
    pub transient: bool,
}

impl Contributor {
    /// Captures the range found at the given position.
    pub fn new(at: RangeRef, range: &FaultRange) -> Self {
        Self {
            at,
            addr: range.addr,
            mask: range.mask,
            transient: range.transient,
        }
    }
}

/// Correction outcome of an intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// The ECC fixes the data.
    Corrected,
    /// The ECC detects the error but cannot fix it.
    Uncorrected,
    /// The ECC neither fixes nor flags the error.
    Undetected,
}

/// Common footprint of fault ranges overlapping at some granularity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultIntersection {
    /// Footprint shared by all contributors.
    pub range: FaultRange,
    /// Ranges forming the intersection.
    pub contributors: Vec<Contributor>,
    /// Correction outcome.
    pub outcome: Outcome,
    /// Number of symbols recovered by additional redundancy.
    pub offset: usize,
}

impl FaultIntersection {
    /// The intersection of no fault, matching every address.
    pub fn identity() -> Self {
        Self {
            range: FaultRange::identity(),
            contributors: Vec::new(),
            outcome: Outcome::Corrected,
            offset: 0,
        }
    }

    /// The intersection of a single fault widened by `min_mask`.
    pub fn from_range(at: RangeRef, fault: &FaultRange, min_mask: u64) -> Self {
        Self {
            range: fault.widened(min_mask),
            contributors: vec![Contributor::new(at, fault)],
            outcome: Outcome::Undetected,
            offset: 0,
        }
    }

    /// The intersection of a single captured fault widened by `min_mask`.
    pub fn from_contributor(contributor: &Contributor, min_mask: u64) -> Self {
        let fault = FaultRange::new(
            contributor.at.chip,
            contributor.addr,
            contributor.mask,
            contributor.transient,
        );
        Self {
            range: fault.widened(min_mask),
            contributors: vec![contributor.clone()],
            outcome: Outcome::Undetected,
            offset: 0,
        }
    }

    /// Returns whether no fault contributes.
    pub fn is_identity(&self) -> bool {
        self.contributors.is_empty()
    }

    /// Footprint address.
    pub fn addr(&self) -> u64 {
        self.range.addr
    }

    /// Footprint mask.
    pub fn mask(&self) -> u64 {
        self.range.mask
    }

    /// Checks whether the footprints overlap.
    pub fn intersects(&self, other: &FaultIntersection) -> bool {
        self.range.intersects(&other.range)
    }

    /// Checks whether every location of `other` belongs to this footprint.
    pub fn contains(&self, other: &FaultIntersection) -> bool {
        self.intersects(other) && other.mask() & !self.mask() == 0
    }

    /// Narrows the footprint to the part shared with `other` and takes over its contributors.
    pub fn combine(&mut self, other: &FaultIntersection) {
        debug_assert!(self.intersects(other), "combining disjoint fault ranges");
        let was_identity = self.is_identity();
        self.range.addr = (self.range.addr & !self.range.mask) | (other.range.addr & !other.range.mask);
        self.range.mask &= other.range.mask;
        self.range.max_faults = location_bound(self.range.mask);
        if was_identity {
            self.range.chip = other.range.chip;
            self.range.transient = other.range.transient;
            self.outcome = other.outcome;
        } else {
            self.range.transient &= other.range.transient;
        }
        self.contributors.extend(other.contributors.iter().cloned());
    }

    /// Returns the combination of both intersections.
    pub fn intersection(&self, other: &FaultIntersection) -> FaultIntersection {
        let mut result = self.clone();
        result.combine(other);
        result
    }

    /// Number of distinct chips among contributors.
    pub fn chip_count(&self) -> usize {
        let mut chips: Vec<ChipId> = self.contributors.iter().map(|c| c.at.chip).collect();
        chips.sort_unstable();
        chips.dedup();
        chips.len()
    }

    /// Returns whether some contributor lives in the given chip.
    pub fn has_chip(&self, chip: ChipId) -> bool {
        self.contributors.iter().any(|c| c.at.chip == chip)
    }

    /// Number of wrong bits in an ECC word, assuming all contributors sit in different chips.
    ///
    /// Every contributor adds the bits it wildcards inside the word mask plus one.
    pub fn bit_count_sum(&self, word_mask: u64) -> usize {
        self.contributors
            .iter()
            .map(|c| (c.mask & word_mask).count_ones() as usize + 1)
            .sum()
    }

    /// Number of distinct wrong bits inside one codeword of `codeword_cols` columns, assuming all contributors sit
    /// in the same chip and the same codeword.
    pub fn bit_count_aggregate(&self, codec: &AddressCodec, codeword_cols: u32) -> usize {
        let bits = codec.num(Field::Bit) as usize;
        let mut faulty = vec![false; codeword_cols as usize * bits];
        for c in self.contributors.iter() {
            let cols = if codec.is_wild(Field::Column, c.mask) {
                0..codeword_cols
            } else {
                let col = codec.get(Field::Column, c.addr) % codeword_cols;
                col..col + 1
            };
            for col in cols {
                let base = col as usize * bits;
                if codec.is_wild(Field::Bit, c.mask) {
                    faulty[base..base + bits].iter_mut().for_each(|b| *b = true);
                } else {
                    faulty[base + codec.get(Field::Bit, c.addr) as usize] = true;
                }
            }
        }
        faulty.into_iter().filter(|b| *b).count()
    }

    /// Records the failure as detected but not corrected.
    pub fn mark_uncorrectable(&mut self) {
        self.outcome = Outcome::Uncorrected;
        self.range.mark_uncorrectable();
    }

    /// Records the failure as undetected.
    pub fn mark_undetected(&mut self) {
        self.outcome = Outcome::Undetected;
        self.range.mark_uncorrectable();
    }
}

//! Depth-first search for faults of different chips that overlap.
//!
//! Every frame of the search holds the intersection of the faults picked so far (one per chip, in chip order) and
//! the position to resume the scan from. Extending a frame scans the remaining ranges of the following chips; the
//! first range intersecting the frontier becomes a child frame starting at the next chip, and the parent resumes
//! right after that range once the child is done. This enumerates every subset of mutually intersecting faults of
//! distinct chips without materializing the subsets up front.

use crate::range::{Contributor, FaultIntersection};

struct Frame {
    frontier: FaultIntersection,
    chip: usize,
    range: usize,
}

/// Search parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntersectionEngine {
    granularity: u64,
    bound: usize,
}

impl IntersectionEngine {
    /// Creates the engine.
    ///
    /// Every range is widened by `granularity` (the ECC symbol or word) before being matched. Frontiers covering
    /// more than `bound` chips are reported but never extended further.
    pub fn new(granularity: u64, bound: usize) -> Self {
        Self { granularity, bound }
    }

    /// Granularity mask.
    pub fn granularity(&self) -> u64 {
        self.granularity
    }

    /// Number of chips after which the search stops extending a frontier.
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Returns every non-empty intersection satisfying the predicate, in discovery order.
    ///
    /// `chips` holds the visible ranges of every chip. The visiting order is fixed by the order of chips and ranges,
    /// so the output is reproducible.
    pub fn search<P>(&self, chips: &[Vec<Contributor>], predicate: P) -> Vec<FaultIntersection>
    where
        P: Fn(&FaultIntersection) -> bool,
    {
        let candidates: Vec<Vec<FaultIntersection>> = chips
            .iter()
            .map(|ranges| {
                ranges
                    .iter()
                    .map(|c| FaultIntersection::from_contributor(c, self.granularity))
                    .collect()
            })
            .collect();

        let mut results = Vec::new();
        let mut stack = vec![Frame {
            frontier: FaultIntersection::identity(),
            chip: 0,
            range: 0,
        }];
        while let Some(top) = stack.last_mut() {
            let child = if top.frontier.chip_count() > self.bound {
                None
            } else {
                Self::extend(top, &candidates)
            };
            if let Some(child) = child {
                stack.push(child);
            } else if let Some(done) = stack.pop() {
                if !done.frontier.is_identity() && predicate(&done.frontier) {
                    results.push(done.frontier);
                }
            }
        }
        results
    }

    fn extend(frame: &mut Frame, candidates: &[Vec<FaultIntersection>]) -> Option<Frame> {
        while frame.chip < candidates.len() {
            let ranges = &candidates[frame.chip];
            while frame.range < ranges.len() {
                let candidate = &ranges[frame.range];
                frame.range += 1;
                if candidate.intersects(&frame.frontier) {
                    return Some(Frame {
                        frontier: frame.frontier.intersection(candidate),
                        chip: frame.chip + 1,
                        range: 0,
                    });
                }
            }
            frame.chip += 1;
            frame.range = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::{ChipId, RangeRef, Slot};

    fn fault(chip: u32, index: usize, addr: u64, mask: u64) -> Contributor {
        Contributor {
            at: RangeRef {
                chip: ChipId(chip),
                slot: Slot::Raw(index),
            },
            addr,
            mask,
            transient: false,
        }
    }

    #[test]
    fn empty() {
        let engine = IntersectionEngine::new(0b111, 2);
        assert!(engine.search(&[vec![], vec![]], |_| true).is_empty());
    }

    #[test]
    fn all_subsets_of_overlapping_faults() {
        let engine = IntersectionEngine::new(0, 8);
        let chips = vec![
            vec![fault(0, 0, 0, 0xff)],
            vec![fault(1, 0, 0x10, 0x0f)],
            vec![fault(2, 0, 0x11, 0)],
        ];
        let results = engine.search(&chips, |_| true);
        // 3 singles, 3 pairs and the triple
        assert_eq!(results.len(), 7);
        let triple = results.iter().find(|r| r.chip_count() == 3).unwrap();
        assert_eq!(triple.addr(), 0x11);
        assert_eq!(triple.mask(), 0);
    }

    #[test]
    fn same_chip_faults_do_not_combine() {
        let engine = IntersectionEngine::new(0, 8);
        let chips = vec![vec![fault(0, 0, 0, 0xff), fault(0, 1, 0x12, 0)]];
        let results = engine.search(&chips, |f| f.chip_count() > 1);
        assert!(results.is_empty());
    }

    #[test]
    fn granularity_joins_neighbours() {
        let chips = vec![vec![fault(0, 0, 0x20, 0)], vec![fault(1, 0, 0x23, 0)]];
        let fine = IntersectionEngine::new(0, 8).search(&chips, |f| f.chip_count() > 1);
        assert!(fine.is_empty());
        let coarse = IntersectionEngine::new(0b111, 8).search(&chips, |f| f.chip_count() > 1);
        assert_eq!(coarse.len(), 1);
        assert_eq!(coarse[0].addr(), 0x20);
        assert_eq!(coarse[0].mask(), 0b111);
    }

    #[test]
    fn bound_prunes_extension() {
        let chips: Vec<Vec<Contributor>> = (0..6).map(|chip| vec![fault(chip, 0, 0, 0xff)]).collect();
        let results = IntersectionEngine::new(0, 2).search(&chips, |_| true);
        assert_eq!(results.iter().map(|r| r.chip_count()).max(), Some(3));
        // C(6,1) + C(6,2) + C(6,3)
        assert_eq!(results.len(), 6 + 15 + 20);
    }
}

//! Removal of failures counted more than once.
//!
//! The intersection search reports every mutually intersecting subset of faults, so a failure of three chips is
//! also reported through its two-chip subsets, whose footprints contain the three-chip one. Failures are sorted by
//! `(start, end)` so that a container always comes before the ranges it contains.

use std::cmp::Reverse;

use crate::codec::AddressCodec;
use crate::log_warn;
use crate::range::{Contributor, FaultIntersection};

/// Deduplication pass run by a repair scheme.
pub struct Deduplication<'a> {
    name: &'a str,
    codec: &'a AddressCodec,
}

impl<'a> Deduplication<'a> {
    /// Creates the pass, `name` is the owning scheme name used for logging.
    pub fn new(name: &'a str, codec: &'a AddressCodec) -> Self {
        Self { name, codec }
    }

    /// Name of the owning scheme.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Drops every failure contained in another one.
    ///
    /// A contained failure may involve chips its container does not cover. Those chips fail together with the
    /// container's own chips inside the contained footprint, so when that set is larger than the container's current
    /// one it replaces the container's contributors. Sets of different contained failures are never joined, since
    /// they may lie at disjoint addresses. Partially overlapping failures are both kept.
    pub fn run(&self, mut failures: Vec<FaultIntersection>) -> Vec<FaultIntersection> {
        failures.sort_by_key(|f| (f.range.start(), Reverse(f.range.end()), Reverse(f.chip_count())));

        let mut kept: Vec<FaultIntersection> = Vec::with_capacity(failures.len());
        // contributors each kept failure was found with
        let mut own: Vec<Vec<Contributor>> = Vec::with_capacity(failures.len());
        for failure in failures {
            if let Some(i) = kept.iter().position(|k| k.contains(&failure)) {
                let mut worst = kept[i].clone();
                worst.contributors = own[i].clone();
                for contributor in failure.contributors {
                    if !worst.has_chip(contributor.at.chip) {
                        worst.contributors.push(contributor);
                    }
                }
                if worst.chip_count() > kept[i].chip_count() {
                    kept[i] = worst;
                }
                continue;
            }
            for other in kept.iter().filter(|k| k.intersects(&failure)) {
                log_warn!(
                    self,
                    "partially overlapping failures: {} and {}",
                    self.codec.describe(other.addr(), other.mask()),
                    self.codec.describe(failure.addr(), failure.mask())
                );
            }
            own.push(failure.contributors.clone());
            kept.push(failure);
        }
        kept
    }
}

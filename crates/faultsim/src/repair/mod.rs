//! Repair schemes and the results they report.

pub mod bch;
pub mod dedup;
pub mod in_dram;
pub mod stats;
pub mod symbol;
pub mod tiered;

use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign};

use serde::Serialize;

use crate::range::FaultIntersection;

use self::stats::FailureCounters;

/// Number of failures left after a repair pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Failures {
    /// Silent data corruptions.
    pub undetected: u64,
    /// Detected uncorrectable errors.
    pub uncorrected: u64,
}

impl Failures {
    /// Creates the result.
    pub fn new(undetected: u64, uncorrected: u64) -> Self {
        Self {
            undetected,
            uncorrected,
        }
    }

    /// Returns whether any failure remains.
    pub fn any(&self) -> bool {
        self.undetected > 0 || self.uncorrected > 0
    }

    /// Element-wise minimum.
    pub fn min(self, other: Failures) -> Failures {
        Failures::new(
            self.undetected.min(other.undetected),
            self.uncorrected.min(other.uncorrected),
        )
    }

    /// Clamps both counts to `limit`.
    pub fn clamp_to(self, limit: u64) -> Failures {
        Failures::new(self.undetected.min(limit), self.uncorrected.min(limit))
    }
}

impl Add for Failures {
    type Output = Failures;

    fn add(self, rhs: Failures) -> Failures {
        Failures::new(self.undetected + rhs.undetected, self.uncorrected + rhs.uncorrected)
    }
}

impl AddAssign for Failures {
    fn add_assign(&mut self, rhs: Failures) {
        *self = *self + rhs;
    }
}

impl Display for Failures {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "undetected {} uncorrected {}", self.undetected, self.uncorrected)
    }
}

/// Number of injected faults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FaultCount {
    /// Transient faults.
    pub transient: u64,
    /// Permanent faults.
    pub permanent: u64,
}

impl FaultCount {
    /// Total number of faults.
    pub fn total(&self) -> u64 {
        self.transient + self.permanent
    }
}

impl AddAssign for FaultCount {
    fn add_assign(&mut self, rhs: FaultCount) {
        self.transient += rhs.transient;
        self.permanent += rhs.permanent;
    }
}

/// Correction algorithm applied to a domain of type `D`.
///
/// Chip-level schemes (on-die ECC) implement `RepairScheme<ChipDomain>`, module-level schemes implement
/// `RepairScheme<GroupDomain>`.
pub trait RepairScheme<D> {
    /// Scheme name, also used as the log target.
    fn name(&self) -> &str;

    /// Runs the correction over the domain and returns the failures left.
    fn repair(&mut self, domain: &mut D) -> Failures;

    /// Drops everything computed during the current run.
    fn reset(&mut self) {}

    /// Event counters accumulated over all runs.
    fn counters(&self) -> &FailureCounters;

    /// Ranges created by the scheme to represent residual errors.
    fn materialized(&self) -> &[FaultIntersection] {
        &[]
    }
}

//! Composite domain: a module made of chips, repaired by module-level ECC.

use log::{log_enabled, Level};
use serde::Serialize;
use serde_json::json;

use crate::chip::ChipDomain;
use crate::intersection::IntersectionEngine;
use crate::range::{ChipId, Contributor, FaultIntersection};
use crate::repair::{Failures, FaultCount, RepairScheme};
use crate::{log_debug, log_error, log_trace};

/// Child of a group domain.
pub enum Domain {
    /// A single chip.
    Chip(ChipDomain),
    /// A nested group, e.g. a rank or a stack layer.
    Group(GroupDomain),
}

impl Domain {
    /// Domain name.
    pub fn name(&self) -> &str {
        match self {
            Domain::Chip(chip) => chip.name(),
            Domain::Group(group) => group.name(),
        }
    }

    /// Repairs the domain.
    pub fn repair(&mut self) -> Failures {
        match self {
            Domain::Chip(chip) => chip.repair(),
            Domain::Group(group) => group.repair(),
        }
    }

    /// Scrubs transient faults.
    pub fn scrub(&mut self) {
        match self {
            Domain::Chip(chip) => chip.scrub(),
            Domain::Group(group) => group.scrub(),
        }
    }

    /// Prepares the domain for a new run.
    pub fn reset(&mut self) {
        match self {
            Domain::Chip(chip) => chip.reset(),
            Domain::Group(group) => group.reset(),
        }
    }

    /// Number of faults injected during the current run.
    pub fn fault_count(&self) -> FaultCount {
        match self {
            Domain::Chip(chip) => chip.fault_count(),
            Domain::Group(group) => group.fault_count(),
        }
    }

    fn dump_state(&self) {
        match self {
            Domain::Chip(chip) => chip.dump_state(),
            Domain::Group(group) => group.dump_state(),
        }
    }
}

/// Outcomes over all simulated runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DomainStats {
    /// Number of runs.
    pub simulations: u64,
    /// Runs with at least one raw fault.
    pub faulty: u64,
    /// Runs with at least one uncorrected failure.
    pub uncorrected: u64,
    /// Runs with at least one undetected failure.
    pub undetected: u64,
}

impl DomainStats {
    fn rate(&self, count: u64) -> f64 {
        if self.simulations == 0 {
            0.
        } else {
            count as f64 / self.simulations as f64
        }
    }

    /// Fraction of runs with a raw fault.
    pub fn raw_rate(&self) -> f64 {
        self.rate(self.faulty)
    }

    /// Fraction of runs with an uncorrected failure.
    pub fn uncorrected_rate(&self) -> f64 {
        self.rate(self.uncorrected)
    }

    /// Fraction of runs with an undetected failure.
    pub fn undetected_rate(&self) -> f64 {
        self.rate(self.undetected)
    }

    /// Converts a per-run rate to failures in time (failures per 10^9 hours), given the simulated run length.
    pub fn fit(rate: f64, sim_seconds: f64) -> f64 {
        rate * 3600e9 / sim_seconds
    }
}

struct SearchCache {
    engine: IntersectionEngine,
    results: Vec<FaultIntersection>,
}

/// A module (DIMM) made of child domains and module-level repair schemes.
pub struct GroupDomain {
    name: String,
    children: Vec<Domain>,
    schemes: Vec<Box<dyn RepairScheme<GroupDomain>>>,
    cache: Option<SearchCache>,
    n_errors: Failures,
    stats: DomainStats,
}

impl GroupDomain {
    /// Creates an empty group.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
            schemes: Vec::new(),
            cache: None,
            n_errors: Failures::default(),
            stats: DomainStats::default(),
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a child domain.
    pub fn add_child(&mut self, child: Domain) {
        self.cache = None;
        self.children.push(child);
    }

    /// Appends a module-level repair scheme, applied after the previous ones.
    pub fn add_scheme(&mut self, scheme: Box<dyn RepairScheme<GroupDomain>>) {
        self.schemes.push(scheme);
    }

    /// Child domains.
    pub fn children(&self) -> &[Domain] {
        &self.children
    }

    /// Module-level repair schemes.
    pub fn schemes(&self) -> &[Box<dyn RepairScheme<GroupDomain>>] {
        &self.schemes
    }

    /// All chips of the group and its nested groups, in order.
    pub fn chips(&self) -> Vec<&ChipDomain> {
        let mut chips = Vec::new();
        for child in self.children.iter() {
            match child {
                Domain::Chip(chip) => chips.push(chip),
                Domain::Group(group) => chips.extend(group.chips()),
            }
        }
        chips
    }

    /// Mutable access to the chip with the given identifier.
    ///
    /// Drops the search cache, since the caller may change the chip's faults.
    pub fn chip_mut(&mut self, id: ChipId) -> Option<&mut ChipDomain> {
        self.cache = None;
        self.find_chip_mut(id)
    }

    fn find_chip_mut(&mut self, id: ChipId) -> Option<&mut ChipDomain> {
        for child in self.children.iter_mut() {
            let found = match child {
                Domain::Chip(chip) if chip.id() == id => Some(chip),
                Domain::Chip(_) => None,
                Domain::Group(group) => group.chip_mut(id),
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Mutable access to the chip at the given position of [`chips`](Self::chips).
    pub fn chip_at_mut(&mut self, position: usize) -> Option<&mut ChipDomain> {
        let id = self.chips().get(position).map(|chip| chip.id())?;
        self.chip_mut(id)
    }

    /// Ranges visible in every chip, grouped by chip.
    pub fn visible_ranges(&self) -> Vec<Vec<Contributor>> {
        self.chips().into_iter().map(|chip| chip.contributors()).collect()
    }

    /// Runs the intersection search over the chips and returns the intersections satisfying the predicate.
    ///
    /// The unfiltered result is kept until the next [`prepare`](Self::prepare), so schemes using the same
    /// granularity and bound share one search.
    pub fn intersecting_ranges<P>(&mut self, engine: IntersectionEngine, predicate: P) -> Vec<FaultIntersection>
    where
        P: Fn(&FaultIntersection) -> bool,
    {
        let cached = matches!(&self.cache, Some(cache) if cache.engine == engine);
        if !cached {
            let results = engine.search(&self.visible_ranges(), |_| true);
            log_trace!(
                self,
                "search at granularity {:#x} up to {} chips found {} candidates",
                engine.granularity(),
                engine.bound(),
                results.len()
            );
            self.cache = Some(SearchCache { engine, results });
        }
        match &self.cache {
            Some(cache) => cache.results.iter().filter(|f| predicate(f)).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Returns whether a search result is cached.
    pub fn is_search_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Invalidates the search cache, must be called whenever faults change.
    pub fn prepare(&mut self) {
        self.cache = None;
        for child in self.children.iter_mut() {
            if let Domain::Group(group) = child {
                group.prepare();
            }
        }
    }

    /// Marks every contributor of the failure so that scrubs keep it.
    pub fn mark_uncorrectable(&mut self, failure: &FaultIntersection) {
        for contributor in failure.contributors.iter() {
            match self.find_chip_mut(contributor.at.chip) {
                Some(chip) => chip.mark_uncorrectable(contributor.at.slot),
                None => log_error!(self, "failure contributor {:?} is not in the module", contributor.at),
            }
        }
    }

    /// Repairs the children, then applies every module-level scheme.
    ///
    /// Child results are clamped to the child's own fault count. Every scheme runs over the same faults and the
    /// smallest counts are kept, so a later scheme can save failures an earlier one missed.
    pub fn repair(&mut self) -> Failures {
        self.prepare();

        let faults_before = self.fault_count().total();
        let mut result = Failures::default();
        for child in self.children.iter_mut() {
            let child_raw = child.fault_count().total();
            result += child.repair().clamp_to(child_raw);
        }

        let mut schemes = std::mem::take(&mut self.schemes);
        for scheme in schemes.iter_mut() {
            let after = scheme.repair(self);
            if faults_before != 0 {
                log_debug!(
                    self,
                    "{}",
                    json!({"scheme": scheme.name(), "before": result, "after": after})
                );
                if log_enabled!(Level::Trace) {
                    self.dump_state();
                }
            }
            result = result.min(after);
        }
        self.schemes = schemes;

        if result.undetected > 0 {
            self.n_errors.undetected += 1;
        }
        if result.uncorrected > 0 {
            self.n_errors.uncorrected += 1;
        }
        result
    }

    /// Removes transient faults that did not take part in a counted failure.
    pub fn scrub(&mut self) {
        self.prepare();
        for child in self.children.iter_mut() {
            child.scrub();
        }
    }

    /// Clears all faults and per-run state, and starts a new run.
    pub fn reset(&mut self) {
        self.n_errors = Failures::default();
        self.cache = None;
        self.stats.simulations += 1;
        for child in self.children.iter_mut() {
            child.reset();
        }
        for scheme in self.schemes.iter_mut() {
            scheme.reset();
        }
    }

    /// Number of faults injected during the current run.
    pub fn fault_count(&self) -> FaultCount {
        let mut count = FaultCount::default();
        for child in self.children.iter() {
            count += child.fault_count();
        }
        count
    }

    /// Number of repair passes of the current run that left failures.
    pub fn run_errors(&self) -> Failures {
        self.n_errors
    }

    /// Records the outcome of the current run.
    pub fn finalize(&mut self) {
        for child in self.children.iter_mut() {
            if let Domain::Group(group) = child {
                group.finalize();
            }
        }
        if self.fault_count().total() != 0 {
            self.stats.faulty += 1;
        }
        if self.n_errors.undetected != 0 {
            self.stats.undetected += 1;
        }
        if self.n_errors.uncorrected != 0 {
            self.stats.uncorrected += 1;
        }
    }

    /// Outcomes over all runs.
    pub fn stats(&self) -> DomainStats {
        self.stats
    }

    /// Forgets the outcomes of all runs.
    pub fn reset_stats(&mut self) {
        self.stats = DomainStats::default();
    }

    /// Logs the visible ranges of every chip.
    pub fn dump_state(&self) {
        for child in self.children.iter() {
            child.dump_state();
        }
    }
}

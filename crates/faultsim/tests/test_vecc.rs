mod common;
use common::*;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rstest::rstest;

use faultsim::repair::stats::Event;
use faultsim::repair::symbol::SymbolRepair;
use faultsim::repair::tiered::TieredRepair;
use faultsim::{ChipId, EccConfig, Error, Failures, FaultClass, Field, GroupDomain, RepairScheme};

fn vecc(protected_fraction: f64, sw_tolerance: f64, unprotected_sw_tolerance: f64) -> EccConfig {
    EccConfig::Vecc {
        correct: 1,
        detect: 2,
        log_symbol_size: 3,
        additional: 1,
        protected_fraction,
        sw_tolerance: vec![sw_tolerance; FaultClass::COUNT],
        unprotected_sw_tolerance: vec![unprotected_sw_tolerance; FaultClass::COUNT],
    }
}

fn tiered(correct: usize, detect: usize, additional: usize) -> EccConfig {
    EccConfig::Vecc {
        correct,
        detect,
        log_symbol_size: 3,
        additional,
        protected_fraction: 1.,
        sw_tolerance: vec![0.; FaultClass::COUNT],
        unprotected_sw_tolerance: vec![0.; FaultClass::COUNT],
    }
}

fn two_chip_failure(ecc: EccConfig) -> GroupDomain {
    let mut module = module(&dimm_config(18, 2, ecc));
    inject(&mut module, 0, bit(0, 4, 100, 10, 1));
    inject(&mut module, 1, bit(0, 4, 100, 10, 2));
    module
}

fn count(module: &GroupDomain, event: Event) -> u64 {
    module.schemes()[0].counters().total(event)
}

#[test]
fn no_faults() {
    let mut module = module(&dimm_config(18, 2, vecc(0.5, 0., 0.)));
    assert_eq!(module.repair(), Failures::default());
}

#[test]
fn protected_rows_correct_one_more_symbol() {
    let mut module = two_chip_failure(vecc(1., 0., 0.));
    assert_eq!(module.repair(), Failures::default());
    assert_eq!(count(&module, Event::TierProtected), 1);
}

#[test]
fn unprotected_rows_fail() {
    let mut module = two_chip_failure(vecc(0., 0., 0.));
    assert_eq!(module.repair(), Failures::new(0, 1));
    assert_eq!(count(&module, Event::Uncorrected), 1);
}

#[test]
fn software_tolerates_unprotected_failure() {
    let mut module = two_chip_failure(vecc(0., 0., 1.));
    assert_eq!(module.repair(), Failures::default());
    assert_eq!(count(&module, Event::UnprotectedSoftwareTolerated), 1);
    assert_eq!(count(&module, Event::SoftwareTolerated), 0);
}

#[test]
fn faulted_redundancy_falls_back_to_software() {
    let mut module = two_chip_failure(vecc(1., 0., 0.));
    // every chunk of rank 1 is broken in chip 5
    inject(&mut module, 5, (Some(1), None, None, None, None));
    assert_eq!(module.repair(), Failures::new(0, 1));
    assert_eq!(count(&module, Event::TierProtected), 0);

    let mut module = two_chip_failure(vecc(1., 1., 0.));
    inject(&mut module, 5, (Some(1), None, None, None, None));
    assert_eq!(module.repair(), Failures::default());
    assert_eq!(count(&module, Event::SoftwareTolerated), 1);
}

#[test]
fn too_many_chips_for_the_second_tier() {
    let mut module = two_chip_failure(vecc(1., 1., 1.));
    inject(&mut module, 2, bit(0, 4, 100, 10, 3));
    // three chips exceed both tiers and the detection capacity, software tolerance only covers detected errors
    assert_eq!(module.repair(), Failures::new(1, 0));
    assert_eq!(count(&module, Event::Undetected), 1);
}

#[test]
fn multi_bank_failures_are_not_tier_protected() {
    let mut module = module(&dimm_config(18, 2, vecc(1., 0., 0.)));
    inject(&mut module, 0, (Some(0), None, None, None, None));
    inject(&mut module, 1, (Some(0), None, None, None, None));
    assert_eq!(module.repair(), Failures::new(0, 1));
}

#[test]
fn tolerated_fraction() {
    let mut module = two_chip_failure(EccConfig::None);
    let codec = module.chips()[0].codec().clone();
    let symbol = SymbolRepair::new("vecc", 1, 2, codec).unwrap();
    let mut scheme = TieredRepair::new(symbol, 1, 1., 7).unwrap();
    assert_eq!(scheme.tolerated_fraction(), 0.);
    module.prepare();
    assert_eq!(scheme.repair(&mut module), Failures::default());
    assert_eq!(scheme.tolerated_fraction(), 1.);
}

#[test]
fn configuration_errors() {
    let one_rank = module(&dimm_config(18, 1, EccConfig::None));
    let codec = one_rank.chips()[0].codec().clone();
    let symbol = SymbolRepair::new("vecc", 1, 2, codec).unwrap();
    assert!(matches!(TieredRepair::new(symbol, 1, 0.5, 0), Err(Error::TooFewRanks)));

    let two_ranks = module(&dimm_config(18, 2, EccConfig::None));
    let codec = two_ranks.chips()[0].codec().clone();
    let symbol = SymbolRepair::new("vecc", 1, 2, codec.clone()).unwrap();
    assert!(matches!(
        TieredRepair::new(symbol, 1, 1.5, 0),
        Err(Error::InvalidProbability(_))
    ));
    let symbol = SymbolRepair::new("vecc", 1, 2, codec).unwrap();
    let scheme = TieredRepair::new(symbol, 1, 0.5, 0).unwrap();
    assert!(matches!(
        scheme.with_software_tolerance(vec![0.; 6], vec![0.; 7]),
        Err(Error::ToleranceTableLength { expected: 7, found: 6 })
    ));
}

#[rstest]
#[case(tiered(1, 2, 1), tiered(1, 2, 2))]
#[case(tiered(1, 2, 1), tiered(2, 3, 1))]
fn stronger_code_never_fails_more(#[case] weaker: EccConfig, #[case] stronger: EccConfig) {
    let classes = [FaultClass::Bit, FaultClass::Word, FaultClass::Column, FaultClass::Row, FaultClass::Bank];
    for seed in 0..20 {
        let mut modules: Vec<GroupDomain> = [weaker.clone(), stronger.clone()]
            .into_iter()
            .map(|ecc| {
                let mut config = dimm_config(18, 2, ecc);
                config.banks = 2;
                config.rows = 8;
                config.cols = 8;
                module(&config)
            })
            .collect();
        let codec = modules[0].chips()[0].codec().clone();
        let mut rng = Pcg64::seed_from_u64(seed);
        // faults stay in rank 0, so the redundant symbols in rank 1 are always available
        for _ in 0..10 {
            let chip = rng.gen_range(0..18);
            let class = classes[rng.gen_range(0..classes.len())];
            let mut fault = codec.random_range(ChipId::default(), class, false, &mut rng);
            codec.put(Field::Rank, &mut fault.addr, 0);
            for module in modules.iter_mut() {
                module.chip_at_mut(chip).unwrap().insert_fault(fault.clone());
            }
        }
        let results: Vec<Failures> = modules.iter_mut().map(|m| m.repair()).collect();
        assert!(results[0].any() || !results[1].any(), "seed {}: {:?}", seed, results);
        assert!(
            results[0].undetected > 0 || results[1].undetected == 0,
            "seed {}: {:?}",
            seed,
            results
        );
    }
}

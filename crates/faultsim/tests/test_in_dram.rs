mod common;
use common::*;

use faultsim::range::{RangeRef, Slot};
use faultsim::{ChipId, EccConfig, FaultIntersection, Field, ModuleConfig};

fn config() -> ModuleConfig {
    let mut config = dimm_config(
        16,
        1,
        EccConfig::InDram {
            codeword: 136,
            dataword: 128,
        },
    );
    config.cols = 2176;
    config
}

// (codeword - dataword) / bus_bits
const WORD_SIZE: u32 = 2;
// codeword / bus_bits
const CODEWORD_COLS: u32 = 34;

#[test]
fn single_bit() {
    let mut module = module(&config());
    inject(&mut module, 0, bit(0, 3, 4321, 1500, 2));
    assert!(!module.repair().any());
}

#[test]
fn two_bits_in_one_codeword() {
    let mut module = module(&config());
    let col = 1500;
    let (word, pos) = (col / WORD_SIZE, col % WORD_SIZE);
    let fr0 = fault(&module, bit(0, 3, 4321, col, 2), false);
    let fr1 = fault(&module, bit(0, 3, 4321, word * WORD_SIZE + (pos + 1) % WORD_SIZE, 2), false);

    let codec = module.chips()[0].codec().clone();
    let at = |index| RangeRef {
        chip: ChipId(0),
        slot: Slot::Raw(index),
    };
    let fi0 = FaultIntersection::from_range(at(0), &fr0, 127);
    let fi1 = FaultIntersection::from_range(at(1), &fr1, 127);
    assert_eq!(fi0.intersection(&fi1).bit_count_aggregate(&codec, CODEWORD_COLS), 2);

    module.chip_at_mut(0).unwrap().insert_fault(fr0);
    module.chip_at_mut(0).unwrap().insert_fault(fr1);
    assert!(module.repair().any());
}

#[test]
fn two_bits_in_different_codewords() {
    let mut module = module(&config());
    inject(&mut module, 0, bit(0, 3, 4321, 1500, 2));
    inject(&mut module, 0, bit(0, 3, 4321, 1500 + CODEWORD_COLS, 2));
    assert!(!module.repair().any());
}

#[test]
fn same_bit_twice() {
    let mut module = module(&config());
    inject(&mut module, 0, bit(0, 3, 4321, 1500, 2));
    inject(&mut module, 0, bit(0, 3, 4321, 1500, 2));
    assert!(!module.repair().any());
}

#[test]
fn bit_under_column_fault() {
    let mut module = module(&config());
    inject(&mut module, 0, (Some(0), Some(3), None, Some(700), None));
    inject(&mut module, 0, bit(0, 3, 12, 700, 0));
    assert!(module.repair().any());

    // the column error wins over the word error, one residual per codeword
    let chip = module.chips()[0];
    let residuals = chip.schemes()[0].materialized();
    assert_eq!(residuals.len(), 1);
    let codec = chip.codec();
    assert!(codec.is_wild(Field::Row, residuals[0].mask()));
    assert_eq!(codec.get(Field::Column, residuals[0].addr()), 700 / CODEWORD_COLS * 32);
}

#[test]
fn coarse_faults_pass_through() {
    let mut module = module(&config());
    inject(&mut module, 2, (Some(0), Some(3), Some(8), None, None));
    let result = module.repair();
    assert_eq!(result.uncorrected, 1);
    assert_eq!(module.chips()[2].ranges().len(), 1);

    module.reset();
    inject(&mut module, 2, bit(0, 3, 8, 100, 0));
    assert!(!module.repair().any());
    assert!(module.chips()[2].ranges().is_empty());
}

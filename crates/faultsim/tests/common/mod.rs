#![allow(dead_code)]

use std::io::Write;

use env_logger::Builder;

use faultsim::{build_module, ChipId, EccConfig, FaultRange, GroupDomain, ModuleConfig};

pub fn init_logger() {
    let _ = Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .is_test(true)
        .try_init();
}

pub fn dimm_config(chips: u32, ranks: u32, ecc: EccConfig) -> ModuleConfig {
    ModuleConfig {
        chips_per_rank: chips,
        chip_bus_bits: 4,
        ranks,
        banks: 8,
        rows: 16384,
        cols: 1024,
        ecc,
        seed: 123,
    }
}

pub fn chipkill(correct: usize, detect: usize) -> EccConfig {
    EccConfig::Chipkill {
        correct,
        detect,
        log_symbol_size: 3,
    }
}

pub fn module(config: &ModuleConfig) -> GroupDomain {
    init_logger();
    build_module(config, 0).unwrap()
}

/// Coordinates as `(rank, bank, row, column, bit)`, `None` wildcards the field.
pub type Coords = (Option<u32>, Option<u32>, Option<u32>, Option<u32>, Option<u32>);

pub fn fault(module: &GroupDomain, coords: Coords, transient: bool) -> FaultRange {
    let (rank, bank, row, col, bit) = coords;
    module.chips()[0]
        .codec()
        .range(ChipId::default(), [bit, col, row, bank, rank], transient)
}

pub fn bit(rank: u32, bank: u32, row: u32, col: u32, bit: u32) -> Coords {
    (Some(rank), Some(bank), Some(row), Some(col), Some(bit))
}

pub fn inject(module: &mut GroupDomain, chip: usize, coords: Coords) {
    let range = fault(module, coords, false);
    module.chip_at_mut(chip).unwrap().insert_fault(range);
}

pub fn inject_transient(module: &mut GroupDomain, chip: usize, coords: Coords) {
    let range = fault(module, coords, true);
    module.chip_at_mut(chip).unwrap().insert_fault(range);
}

//! Module configuration and the factory building a module from it.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sugars::boxed;

use crate::chip::ChipDomain;
use crate::codec::{AddressCodec, ChipGeometry};
use crate::error::{Error, Result};
use crate::fault_class::FaultClass;
use crate::group::{Domain, GroupDomain};
use crate::range::ChipId;
use crate::repair::bch::BitRepair;
use crate::repair::in_dram::InDramRepair;
use crate::repair::symbol::{SymbolRepair, DEFAULT_LOG_SYMBOL_SIZE};
use crate::repair::tiered::TieredRepair;

fn default_log_symbol_size() -> u32 {
    DEFAULT_LOG_SYMBOL_SIZE
}

fn default_tolerance() -> Vec<f64> {
    vec![0.; FaultClass::COUNT]
}

fn default_codeword() -> u32 {
    136
}

fn default_dataword() -> u32 {
    128
}

/// ECC mode of a module with its parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EccConfig {
    /// No correction, every fault is a failure.
    #[default]
    None,
    /// BCH code over bits.
    Bch {
        /// Corrected bits per word.
        correct: usize,
        /// Detected bits per word.
        detect: usize,
    },
    /// ChipKill over symbols.
    Chipkill {
        /// Corrected symbols per word.
        correct: usize,
        /// Detected symbols per word.
        detect: usize,
        /// Symbol size is `2^log_symbol_size` bits.
        #[serde(default = "default_log_symbol_size")]
        log_symbol_size: u32,
    },
    /// ChipKill with additional redundancy and software tolerance.
    Vecc {
        /// Corrected symbols per word.
        correct: usize,
        /// Detected symbols per word.
        detect: usize,
        /// Symbol size is `2^log_symbol_size` bits.
        #[serde(default = "default_log_symbol_size")]
        log_symbol_size: u32,
        /// Additional correctable symbols for protected rows.
        additional: usize,
        /// Fraction of rows holding additional redundancy.
        protected_fraction: f64,
        /// Probability, per fault class, that software tolerates a failure of protected memory.
        #[serde(default = "default_tolerance")]
        sw_tolerance: Vec<f64>,
        /// Probability, per fault class, that software tolerates a failure of unprotected memory.
        #[serde(default = "default_tolerance")]
        unprotected_sw_tolerance: Vec<f64>,
    },
    /// BCH code inside every chip.
    InDram {
        /// Codeword size in bits.
        #[serde(default = "default_codeword")]
        codeword: u32,
        /// Dataword size in bits.
        #[serde(default = "default_dataword")]
        dataword: u32,
    },
}

/// YAML-serializable description of a memory module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Number of chips accessed together.
    pub chips_per_rank: u32,
    /// Data bus width of every chip.
    pub chip_bus_bits: u32,
    /// Number of ranks.
    pub ranks: u32,
    /// Number of banks per rank.
    pub banks: u32,
    /// Number of rows per bank.
    pub rows: u32,
    /// Number of columns per row.
    pub cols: u32,
    /// ECC mode.
    #[serde(default)]
    pub ecc: EccConfig,
    /// Seed of all random generators of the module.
    #[serde(default)]
    pub seed: u64,
}

impl ModuleConfig {
    /// Reads the config from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: ModuleConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Geometry shared by all chips.
    pub fn geometry(&self) -> ChipGeometry {
        ChipGeometry {
            bus_bits: self.chip_bus_bits,
            cols: self.cols,
            rows: self.rows,
            banks: self.banks,
            ranks: self.ranks,
        }
    }

    /// Reports the first configuration error, if any.
    pub fn validate(&self) -> Result<()> {
        if self.chips_per_rank == 0 {
            return Err(Error::InvalidGeometry("module without chips".to_string()));
        }
        let codec = AddressCodec::new(&self.geometry())?;
        match &self.ecc {
            EccConfig::None => {}
            EccConfig::Bch { correct, detect } => {
                BitRepair::new("bch", *correct, *detect, codec)?;
            }
            EccConfig::Chipkill {
                correct,
                detect,
                log_symbol_size,
            } => {
                SymbolRepair::new("chipkill", *correct, *detect, codec)?.with_symbol_size(*log_symbol_size)?;
            }
            EccConfig::Vecc {
                correct,
                detect,
                log_symbol_size,
                additional,
                protected_fraction,
                sw_tolerance,
                unprotected_sw_tolerance,
            } => {
                let symbol = SymbolRepair::new("vecc", *correct, *detect, codec)?.with_symbol_size(*log_symbol_size)?;
                TieredRepair::new(symbol, *additional, *protected_fraction, 0)?
                    .with_software_tolerance(sw_tolerance.clone(), unprotected_sw_tolerance.clone())?;
            }
            EccConfig::InDram { codeword, dataword } => {
                InDramRepair::new("iecc", *codeword, *dataword, &codec)?;
            }
        }
        Ok(())
    }
}

/// Derives the seed of one random generator of a module.
pub fn derive_seed(seed: u64, module: usize, stream: u64) -> u64 {
    seed.wrapping_mul(6364136223846793005)
        .wrapping_add(((module as u64) << 32) ^ stream)
}

/// Builds module number `index`: `chips_per_rank` chips sharing one geometry and the configured repair schemes.
///
/// Chips are named `module{index}.chip{j}` and get identifiers `0..chips_per_rank`. Every chip and every scheme
/// gets its own generator.
pub fn build_module(config: &ModuleConfig, index: usize) -> Result<GroupDomain> {
    let codec = AddressCodec::new(&config.geometry())?;
    let mut module = GroupDomain::new(&format!("module{}", index));

    for j in 0..config.chips_per_rank {
        let name = format!("module{}.chip{}", index, j);
        let mut chip = ChipDomain::new(ChipId(j), &name, codec.clone(), derive_seed(config.seed, index, j as u64));
        if let EccConfig::InDram { codeword, dataword } = &config.ecc {
            let iecc = InDramRepair::new(&format!("{}.iecc", name), *codeword, *dataword, &codec)?;
            chip.add_scheme(boxed!(iecc));
        }
        module.add_child(Domain::Chip(chip));
    }

    let scheme_seed = derive_seed(config.seed, index, u32::MAX as u64);
    match &config.ecc {
        EccConfig::None | EccConfig::InDram { .. } => {}
        EccConfig::Bch { correct, detect } => {
            let name = format!("module{}.bch{}ec{}ed", index, correct, detect);
            module.add_scheme(boxed!(BitRepair::new(&name, *correct, *detect, codec)?));
        }
        EccConfig::Chipkill {
            correct,
            detect,
            log_symbol_size,
        } => {
            let name = format!("module{}.chipkill{}{}", index, correct, detect);
            let scheme = SymbolRepair::new(&name, *correct, *detect, codec)?.with_symbol_size(*log_symbol_size)?;
            module.add_scheme(boxed!(scheme));
        }
        EccConfig::Vecc {
            correct,
            detect,
            log_symbol_size,
            additional,
            protected_fraction,
            sw_tolerance,
            unprotected_sw_tolerance,
        } => {
            let name = format!("module{}.vecc{}{}+{}", index, correct, detect, additional);
            let symbol = SymbolRepair::new(&name, *correct, *detect, codec)?.with_symbol_size(*log_symbol_size)?;
            let scheme = TieredRepair::new(symbol, *additional, *protected_fraction, scheme_seed)?
                .with_software_tolerance(sw_tolerance.clone(), unprotected_sw_tolerance.clone())?;
            module.add_scheme(boxed!(scheme));
        }
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHIPKILL: &str = "
chips_per_rank: 18
chip_bus_bits: 4
ranks: 1
banks: 8
rows: 16384
cols: 1024
seed: 5
ecc:
  mode: chipkill
  correct: 1
  detect: 2
";

    #[test]
    fn parse_chipkill() {
        let config: ModuleConfig = serde_yaml::from_str(CHIPKILL).unwrap();
        assert_eq!(
            config.ecc,
            EccConfig::Chipkill {
                correct: 1,
                detect: 2,
                log_symbol_size: 3
            }
        );
        let module = build_module(&config, 3).unwrap();
        assert_eq!(module.name(), "module3");
        assert_eq!(module.chips().len(), 18);
        assert_eq!(module.chips()[17].name(), "module3.chip17");
        assert_eq!(module.schemes().len(), 1);
    }

    #[test]
    fn default_ecc_is_none() {
        let config: ModuleConfig =
            serde_yaml::from_str("{chips_per_rank: 8, chip_bus_bits: 8, ranks: 1, banks: 8, rows: 1024, cols: 1024}")
                .unwrap();
        assert_eq!(config.ecc, EccConfig::None);
        assert!(build_module(&config, 0).unwrap().schemes().is_empty());
    }

    #[test]
    fn in_dram_schemes_live_in_chips() {
        let config: ModuleConfig = serde_yaml::from_str(
            "{chips_per_rank: 16, chip_bus_bits: 4, ranks: 1, banks: 8, rows: 16384, cols: 2176, ecc: {mode: in_dram}}",
        )
        .unwrap();
        let module = build_module(&config, 0).unwrap();
        assert!(module.schemes().is_empty());
        assert!(module.chips().iter().all(|chip| chip.schemes().len() == 1));
    }

    #[test]
    fn configuration_errors() {
        let mut config: ModuleConfig = serde_yaml::from_str(CHIPKILL).unwrap();
        config.ecc = EccConfig::Bch { correct: 2, detect: 3 };
        assert!(matches!(config.validate(), Err(Error::UnsupportedBch { .. })));
        config.ecc = EccConfig::Bch { correct: 3, detect: 5 };
        assert!(matches!(config.validate(), Err(Error::UnsupportedBch { .. })));
        config.ecc = EccConfig::Chipkill {
            correct: 2,
            detect: 1,
            log_symbol_size: 3,
        };
        assert!(matches!(config.validate(), Err(Error::DetectBelowCorrect { .. })));
        config.ecc = EccConfig::Chipkill {
            correct: 1,
            detect: 2,
            log_symbol_size: 64,
        };
        assert!(matches!(config.validate(), Err(Error::InvalidSymbolSize(64))));
        assert!(matches!(build_module(&config, 0), Err(Error::InvalidSymbolSize(64))));
        config.ecc = EccConfig::InDram {
            codeword: 137,
            dataword: 128,
        };
        assert!(matches!(config.validate(), Err(Error::InDramDetectionUnsupported)));
        config.ecc = EccConfig::InDram {
            codeword: 139,
            dataword: 128,
        };
        assert!(matches!(config.validate(), Err(Error::InvalidInDramCode { .. })));
        // 1024 columns of 4 bits do not hold whole 136-bit codewords
        config.ecc = EccConfig::InDram {
            codeword: 136,
            dataword: 128,
        };
        assert!(matches!(config.validate(), Err(Error::InDramGeometry(_))));
        config.ecc = EccConfig::Vecc {
            correct: 1,
            detect: 2,
            log_symbol_size: 3,
            additional: 1,
            protected_fraction: 0.5,
            sw_tolerance: vec![0.; 7],
            unprotected_sw_tolerance: vec![0.; 7],
        };
        assert!(matches!(config.validate(), Err(Error::TooFewRanks)));
        config.ranks = 2;
        assert!(config.validate().is_ok());
        if let EccConfig::Vecc { sw_tolerance, .. } = &mut config.ecc {
            sw_tolerance.pop();
        }
        assert!(matches!(
            config.validate(),
            Err(Error::ToleranceTableLength { expected: 7, found: 6 })
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            ModuleConfig::from_file("/nonexistent/module.yaml"),
            Err(Error::Io(_))
        ));
    }
}

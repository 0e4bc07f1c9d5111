//! Coarseness classes of fault footprints.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Fault class, ordered from the finest footprint to the coarsest one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FaultClass {
    /// Single bit.
    Bit,
    /// All bits of a single column access.
    Word,
    /// A column across all rows of a bank.
    Column,
    /// A whole row of a bank.
    Row,
    /// A whole bank.
    Bank,
    /// All banks of a rank.
    MultiBank,
    /// All ranks.
    MultiRank,
}

impl FaultClass {
    /// Number of fault classes, i.e. the length of tables indexed by class.
    pub const COUNT: usize = 7;

    /// All classes in ascending order.
    pub const ALL: [FaultClass; FaultClass::COUNT] = [
        FaultClass::Bit,
        FaultClass::Word,
        FaultClass::Column,
        FaultClass::Row,
        FaultClass::Bank,
        FaultClass::MultiBank,
        FaultClass::MultiRank,
    ];

    /// Position of the class in tables indexed by class.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl Display for FaultClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FaultClass::Bit => "1BIT",
            FaultClass::Word => "1WORD",
            FaultClass::Column => "1COL",
            FaultClass::Row => "1ROW",
            FaultClass::Bank => "1BANK",
            FaultClass::MultiBank => "NBANK",
            FaultClass::MultiRank => "NRANK",
        };
        f.write_str(s)
    }
}

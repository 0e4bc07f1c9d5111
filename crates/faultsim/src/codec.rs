//! Packing of chip coordinates into addresses and wildcard masks.
//!
//! A chip address is made of five fields packed from the least significant bit: bit (position inside the chip bus),
//! column, row, bank and rank. Every field is `ceil(log2(size))` bits wide. A mask has the same layout, a field is
//! wildcarded only when all of its bits are set in the mask.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fault_class::FaultClass;
use crate::range::{ChipId, FaultRange};

/// Address field, listed from the least significant one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    /// Bit inside the chip bus.
    Bit,
    /// Column.
    Column,
    /// Row.
    Row,
    /// Bank.
    Bank,
    /// Rank.
    Rank,
}

impl Field {
    /// All fields from the least significant one.
    pub const ALL: [Field; 5] = [Field::Bit, Field::Column, Field::Row, Field::Bank, Field::Rank];

    fn index(self) -> usize {
        self as usize
    }
}

/// Size of every address field of a chip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipGeometry {
    /// Width of the chip data bus (x4, x8...).
    pub bus_bits: u32,
    /// Number of columns per row.
    pub cols: u32,
    /// Number of rows per bank.
    pub rows: u32,
    /// Number of banks per rank.
    pub banks: u32,
    /// Number of ranks.
    pub ranks: u32,
}

fn ceil_log2(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        u64::BITS - (n - 1).leading_zeros()
    }
}

fn low_bits(width: u32) -> u64 {
    if width >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Bit-field layout of one chip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressCodec {
    sizes: [u32; 5],
    widths: [u32; 5],
    shifts: [u32; 5],
}

impl AddressCodec {
    /// Creates the layout for the given geometry.
    pub fn new(geometry: &ChipGeometry) -> Result<Self> {
        let sizes = [
            geometry.bus_bits,
            geometry.cols,
            geometry.rows,
            geometry.banks,
            geometry.ranks,
        ];
        let mut widths = [0; 5];
        let mut shifts = [0; 5];
        let mut shift = 0;
        for field in Field::ALL {
            let size = sizes[field.index()];
            if size == 0 {
                return Err(Error::InvalidGeometry(format!("{:?} field has zero size", field)));
            }
            widths[field.index()] = ceil_log2(size as u64);
            shifts[field.index()] = shift;
            shift += widths[field.index()];
        }
        if shift > u64::BITS {
            return Err(Error::InvalidGeometry(format!("address needs {} bits", shift)));
        }
        Ok(Self { sizes, widths, shifts })
    }

    /// Number of address bits used by the field.
    pub fn field_width(&self, field: Field) -> u32 {
        self.widths[field.index()]
    }

    /// Position of the field's least significant bit.
    pub fn field_shift(&self, field: Field) -> u32 {
        self.shifts[field.index()]
    }

    /// Number of distinct values of the field.
    pub fn num(&self, field: Field) -> u32 {
        self.sizes[field.index()]
    }

    /// Mask with all bits of the field set.
    pub fn field_mask(&self, field: Field) -> u64 {
        low_bits(self.field_width(field)) << self.field_shift(field)
    }

    /// Total number of address bits.
    pub fn address_width(&self) -> u32 {
        self.shifts[Field::Rank.index()] + self.widths[Field::Rank.index()]
    }

    /// Extracts the field value from an address or a mask.
    pub fn get(&self, field: Field, address: u64) -> u32 {
        ((address >> self.field_shift(field)) & low_bits(self.field_width(field))) as u32
    }

    /// Stores the field value into an address or a mask.
    pub fn put(&self, field: Field, address: &mut u64, value: u32) {
        let mask = self.field_mask(field);
        *address = (*address & !mask) | (((value as u64) << self.field_shift(field)) & mask);
    }

    /// Returns a copy of the address with the field replaced.
    pub fn with(&self, field: Field, mut address: u64, value: u32) -> u64 {
        self.put(field, &mut address, value);
        address
    }

    /// Returns whether the mask wildcards the whole field.
    ///
    /// A field of a single value has no bits and is never considered wildcarded.
    pub fn is_wild(&self, field: Field, mask: u64) -> bool {
        let field_mask = self.field_mask(field);
        field_mask != 0 && mask & field_mask == field_mask
    }

    /// Sets all bits of the field in the mask.
    pub fn wildcard(&self, field: Field, mask: &mut u64) {
        *mask |= self.field_mask(field);
    }

    /// Draws a uniformly distributed value of the field.
    pub fn random_value<R: Rng>(&self, field: Field, rng: &mut R) -> u32 {
        rng.gen_range(0..self.num(field))
    }

    /// Number of physical locations covered by the wildcarded fields of the mask.
    pub fn max_faults(&self, mask: u64) -> u64 {
        Field::ALL
            .iter()
            .filter(|field| self.is_wild(**field, mask))
            .fold(1u64, |acc, field| acc.saturating_mul(self.num(*field) as u64))
    }

    /// Classifies a footprint by its wildcarded fields, checking the coarsest fields first.
    pub fn mask_class(&self, mask: u64) -> FaultClass {
        if self.is_wild(Field::Rank, mask) {
            FaultClass::MultiRank
        } else if self.is_wild(Field::Bank, mask) {
            FaultClass::MultiBank
        } else if self.is_wild(Field::Row, mask) && self.is_wild(Field::Column, mask) {
            // a bank failure needs both rows and columns wildcarded
            FaultClass::Bank
        } else if self.is_wild(Field::Row, mask) {
            FaultClass::Column
        } else if self.is_wild(Field::Column, mask) {
            FaultClass::Row
        } else if self.is_wild(Field::Bit, mask) {
            FaultClass::Word
        } else {
            FaultClass::Bit
        }
    }

    /// Creates a fault range from explicit coordinates, wildcarding the fields given as `None`.
    ///
    /// Coordinates are indexed like [`Field::ALL`].
    pub fn range(&self, chip: ChipId, coords: [Option<u32>; 5], transient: bool) -> FaultRange {
        let mut addr = 0;
        let mut mask = 0;
        for field in Field::ALL {
            match coords[field.index()] {
                Some(value) => {
                    debug_assert!(value < self.num(field));
                    self.put(field, &mut addr, value);
                }
                None => self.wildcard(field, &mut mask),
            }
        }
        let mut range = FaultRange::new(chip, addr, mask, transient);
        range.max_faults = self.max_faults(mask);
        range
    }

    /// Generates a random fault of the given class.
    ///
    /// Fixed fields are drawn uniformly, the fields spanned by the class are wildcarded.
    pub fn random_range<R: Rng>(&self, chip: ChipId, class: FaultClass, transient: bool, rng: &mut R) -> FaultRange {
        // (bit, column, row, bank, rank), true means the field is fixed
        let fixed = match class {
            FaultClass::Bit => [true, true, true, true, true],
            FaultClass::Word => [false, true, true, true, true],
            FaultClass::Column => [false, true, false, true, true],
            FaultClass::Row => [false, false, true, true, true],
            FaultClass::Bank => [false, false, false, true, true],
            FaultClass::MultiBank => [false, false, false, false, true],
            FaultClass::MultiRank => [false, false, false, false, false],
        };
        let mut coords = [None; 5];
        for field in Field::ALL {
            if fixed[field.index()] {
                coords[field.index()] = Some(self.random_value(field, rng));
            }
        }
        self.range(chip, coords, transient)
    }

    /// Renders an address and a mask as `(rank, bank, row, column, bit)` tuples.
    pub fn describe(&self, addr: u64, mask: u64) -> String {
        let decode = |value: u64| {
            format!(
                "({},{},{},{},{})",
                self.get(Field::Rank, value),
                self.get(Field::Bank, value),
                self.get(Field::Row, value),
                self.get(Field::Column, value),
                self.get(Field::Bit, value)
            )
        };
        format!("addr {} mask 0x{:x} {}", decode(addr), mask, decode(mask))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    use super::*;

    fn codec() -> AddressCodec {
        AddressCodec::new(&ChipGeometry {
            bus_bits: 4,
            cols: 2176,
            rows: 16384,
            banks: 8,
            ranks: 2,
        })
        .unwrap()
    }

    #[test]
    fn layout() {
        let codec = codec();
        assert_eq!(codec.field_width(Field::Bit), 2);
        assert_eq!(codec.field_width(Field::Column), 12);
        assert_eq!(codec.field_shift(Field::Row), 14);
        assert_eq!(codec.field_width(Field::Rank), 1);
        assert_eq!(codec.address_width(), 2 + 12 + 14 + 3 + 1);
    }

    #[test]
    fn put_get() {
        let codec = codec();
        let mut addr = 0;
        codec.put(Field::Column, &mut addr, 2175);
        codec.put(Field::Bank, &mut addr, 5);
        codec.put(Field::Bit, &mut addr, 3);
        assert_eq!(codec.get(Field::Column, addr), 2175);
        assert_eq!(codec.get(Field::Bank, addr), 5);
        assert_eq!(codec.get(Field::Bit, addr), 3);
        assert_eq!(codec.get(Field::Row, addr), 0);
        codec.put(Field::Column, &mut addr, 1);
        assert_eq!(codec.get(Field::Column, addr), 1);
        assert_eq!(codec.get(Field::Bank, addr), 5);
    }

    #[test]
    fn single_rank_is_never_wild() {
        let codec = AddressCodec::new(&ChipGeometry {
            bus_bits: 4,
            cols: 1024,
            rows: 1024,
            banks: 8,
            ranks: 1,
        })
        .unwrap();
        assert_eq!(codec.field_mask(Field::Rank), 0);
        assert_eq!(codec.mask_class(u64::MAX), FaultClass::MultiBank);
    }

    #[test]
    fn zero_sized_field() {
        let geometry = ChipGeometry {
            bus_bits: 4,
            cols: 0,
            rows: 1024,
            banks: 8,
            ranks: 1,
        };
        assert!(matches!(AddressCodec::new(&geometry), Err(Error::InvalidGeometry(_))));
    }

    #[test]
    fn random_ranges_have_their_class() {
        let codec = codec();
        let mut rng = Pcg64::seed_from_u64(7);
        for class in FaultClass::ALL {
            for _ in 0..20 {
                let range = codec.random_range(ChipId(3), class, false, &mut rng);
                assert_eq!(codec.mask_class(range.mask), class);
                assert_eq!(range.addr & range.mask, 0);
                assert_eq!(range.chip, ChipId(3));
            }
        }
        let row = codec.random_range(ChipId(0), FaultClass::Row, true, &mut rng);
        assert_eq!(row.max_faults, 2176 * 4);
        assert!(row.transient);
    }
}

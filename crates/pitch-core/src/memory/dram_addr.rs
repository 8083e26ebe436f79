use crate::memory::gf2::low_mask;
use crate::memory::{MemConfiguration, PhysAddr};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// DRAM address with sub-channel, rank, bank group, bank, row, and column components.
///
/// Represents the physical organization of a memory address in DRAM,
/// decoded from a physical address using the DRAM configuration.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct DRAMAddr {
    /// Sub-channel number
    #[serde(default)]
    pub subchannel: usize,
    /// Rank number
    #[serde(default)]
    pub rank: usize,
    /// Bank group number
    #[serde(default)]
    pub bank_group: usize,
    /// Bank number
    pub bank: usize,
    /// Row number
    pub row: usize,
    /// Column number
    pub col: usize,
}

impl Display for DRAMAddr {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        if self.subchannel == 0 && self.rank == 0 && self.bank_group == 0 {
            write!(fmt, "({}, {}, {})", self.bank, self.row, self.col)
        } else {
            write!(
                fmt,
                "({}, {}, {}, {}, {}, {})",
                self.subchannel, self.rank, self.bank_group, self.bank, self.row, self.col
            )
        }
    }
}

impl DRAMAddr {
    /// Creates a new DRAM address in sub-channel 0, rank 0, bank group 0.
    ///
    /// # Arguments
    ///
    /// * `bank` - Bank number
    /// * `row` - Row number
    /// * `col` - Column number
    pub fn new(bank: usize, row: usize, col: usize) -> Self {
        DRAMAddr {
            bank,
            row,
            col,
            ..Default::default()
        }
    }

    /// Decodes a physical address into DRAM components.
    ///
    /// Bits above the configured address width are ignored.
    pub fn from_phys(addr: PhysAddr, mem_config: &MemConfiguration) -> DRAMAddr {
        let res = mem_config.dram_mtx.apply(addr & low_mask(mem_config.size));
        DRAMAddr::delinearize(res, mem_config)
    }

    /// Splits a linearized DRAM coordinate into its fields.
    pub fn delinearize(linear: u64, mem_config: &MemConfiguration) -> DRAMAddr {
        DRAMAddr {
            subchannel: mem_config.subchannel.extract(linear),
            rank: mem_config.rank.extract(linear),
            bank_group: mem_config.bank_group.extract(linear),
            bank: mem_config.bank.extract(linear),
            row: mem_config.row.extract(linear),
            col: mem_config.col.extract(linear),
        }
    }
}

impl DRAMAddr {
    /// Linearizes DRAM address components into a single value.
    ///
    /// Components wider than their field are truncated to the field width.
    pub fn linearize(&self, mem_config: &MemConfiguration) -> u64 {
        mem_config.subchannel.insert(self.subchannel)
            | mem_config.rank.insert(self.rank)
            | mem_config.bank_group.insert(self.bank_group)
            | mem_config.bank.insert(self.bank)
            | mem_config.row.insert(self.row)
            | mem_config.col.insert(self.col)
    }

    /// Encodes the DRAM address as a physical address using the inverse matrix.
    pub fn to_phys(&self, mem_config: &MemConfiguration) -> PhysAddr {
        mem_config.addr_mtx.apply(self.linearize(mem_config))
    }

    /// Converts DRAM address back to an address inside a physically contiguous region.
    ///
    /// The bits of `base` above the configured address width are kept, the lower bits
    /// are replaced by the physical address of `self`.
    pub fn to_virt(&self, base: u64, mem_config: &MemConfiguration) -> u64 {
        (base & !low_mask(mem_config.size)) | self.to_phys(mem_config)
    }

    /// Whether both addresses are in the same bank (including bank group, rank and
    /// sub-channel).
    pub fn same_bank(&self, other: &DRAMAddr) -> bool {
        self.subchannel == other.subchannel
            && self.rank == other.rank
            && self.bank_group == other.bank_group
            && self.bank == other.bank
    }

    /// Absolute row distance between two addresses.
    pub fn row_distance(&self, other: &DRAMAddr) -> usize {
        self.row.abs_diff(other.row)
    }
}

impl DRAMAddr {
    /// Adds offsets to the bank, row, and column components.
    ///
    /// # Arguments
    ///
    /// * `bank` - Bank offset to add
    /// * `row` - Row offset to add
    /// * `col` - Column offset to add
    pub fn add(&self, bank: usize, row: usize, col: usize) -> DRAMAddr {
        DRAMAddr {
            bank: self.bank + bank,
            row: self.row + row,
            col: self.col + col,
            ..*self
        }
    }

    /// Subtracts offsets from the bank, row, and column components.
    ///
    /// # Arguments
    ///
    /// * `bank` - Bank offset to subtract
    /// * `row` - Row offset to subtract
    /// * `col` - Column offset to subtract
    pub fn sub(&self, bank: usize, row: usize, col: usize) -> DRAMAddr {
        DRAMAddr {
            bank: self.bank - bank,
            row: self.row - row,
            col: self.col - col,
            ..*self
        }
    }

    /// Moves the address by a signed number of rows.
    ///
    /// Returns `None` if the resulting row would be negative.
    pub fn offset_row(&self, offset: isize) -> Option<DRAMAddr> {
        self.row.checked_add_signed(offset).map(|row| self.with_row(row))
    }

    /// Same address in another row.
    pub fn with_row(&self, row: usize) -> DRAMAddr {
        DRAMAddr { row, ..*self }
    }

    /// Same address in another column.
    pub fn with_col(&self, col: usize) -> DRAMAddr {
        DRAMAddr { col, ..*self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AddressFunctions, desktop_functions};
    use crate::util::Rng;
    use rand::Rng as _;

    fn desktop() -> MemConfiguration {
        MemConfiguration::from_functions(&desktop_functions()).unwrap()
    }

    #[test]
    fn test_origin_maps_to_zero() {
        let config = desktop();
        assert_eq!(DRAMAddr::new(0, 0, 0).to_phys(&config), 0);
        assert_eq!(DRAMAddr::from_phys(0, &config), DRAMAddr::default());
    }

    #[test]
    fn test_dram_roundtrip() {
        let config = desktop();
        for bank in 0..config.get_bank_count() {
            for row in (0..config.get_row_count()).step_by(37) {
                for col in [0, 1, 0x40, 0x1fff] {
                    let addr = DRAMAddr::new(bank, row, col);
                    let phys = addr.to_phys(&config);
                    assert!(phys < 1 << 30);
                    assert_eq!(DRAMAddr::from_phys(phys, &config), addr);
                }
            }
        }
    }

    #[test]
    fn test_phys_roundtrip() {
        let config = desktop();
        let mut rng = Rng::from_seed(7);
        for _ in 0..10_000 {
            let phys = rng.random_range(0..1u64 << 30);
            assert_eq!(DRAMAddr::from_phys(phys, &config).to_phys(&config), phys);
        }
    }

    #[test]
    fn test_row_bits_do_not_touch_bank() {
        let config = desktop();
        // row 1 sets physical bit 19, which feeds bank function 0x88000
        let addr = DRAMAddr::new(0, 1, 0);
        let phys = addr.to_phys(&config);
        assert_eq!(phys & (1 << 19), 1 << 19);
        assert_eq!(DRAMAddr::from_phys(phys, &config).bank, 0);
    }

    #[test]
    fn test_all_fields_roundtrip() {
        let funcs = AddressFunctions::new(12, 0xf00, 0x7)
            .subchannel_fns(&[0x81])
            .rank_fns(&[0x42])
            .bank_group_fns(&[0x24])
            .bank_fns(&[0x18, 0x10]);
        let config = MemConfiguration::from_functions(&funcs).unwrap();
        for phys in 0..1u64 << 12 {
            let dram = DRAMAddr::from_phys(phys, &config);
            assert_eq!(dram.to_phys(&config), phys);
        }
        let addr = DRAMAddr {
            subchannel: 1,
            rank: 1,
            bank_group: 0,
            bank: 2,
            row: 9,
            col: 5,
        };
        assert_eq!(DRAMAddr::from_phys(addr.to_phys(&config), &config), addr);
    }

    #[test]
    fn test_to_virt_keeps_base() {
        let config = desktop();
        let addr = DRAMAddr::new(5, 17, 0);
        let base = 0x2_0000_0000;
        assert_eq!(addr.to_virt(base, &config), base | addr.to_phys(&config));
    }

    #[test]
    fn test_row_helpers() {
        let addr = DRAMAddr::new(2, 10, 4);
        assert_eq!(addr.offset_row(-3), Some(DRAMAddr::new(2, 7, 4)));
        assert_eq!(addr.offset_row(-11), None);
        assert_eq!(addr.add(1, 2, 3).sub(1, 2, 3), addr);
        assert_eq!(addr.row_distance(&DRAMAddr::new(0, 52, 0)), 42);
        assert!(addr.same_bank(&addr.with_row(99).with_col(0)));
        assert_eq!(addr.to_string(), "(2, 10, 4)");
    }
}

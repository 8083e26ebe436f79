//! The `memory` module resolves the mapping between physical addresses and the DRAM
//! geometry, and describes the bit flips reported by a driver.
//!
//! The `memory` module provides the following abstractions:
//! - `AddressMatrix`: A square bit-matrix over GF(2) with explicit width.
//! - `AddressFunctions`: The per-platform bit functions a mapping is resolved from.
//! - `MemConfiguration`: The resolved platform configuration (field layouts plus the
//!   forward and inverse matrices).
//! - `DRAMAddr`: A DRAM coordinate (sub-channel, rank, bank group, bank, row, column).
//! - `BitFlip`: A bit flip observed by a driver scan.
//!
//! The `memory` module also provides the following helper functions:
//! - `independent_functions`: Extracts a linearly independent subset of bit functions.
//! - `rank`: The GF(2) rank of a set of bit functions.
mod dram_addr;
mod gf2;
mod mem_configuration;

pub use self::dram_addr::DRAMAddr;
pub use self::gf2::{AddressMatrix, BitFunction, MAX_MTX_SIZE, independent_functions, rank};
pub use self::mem_configuration::{
    AddressFunctions, BitDef, ConfigurationError, FieldLayout, MemConfiguration,
};

use serde::Serialize;

/// A physical address (or a physical offset inside a driver buffer).
pub type PhysAddr = u64;

/// A flipped word found by a driver scan.
///
/// `addr` is the physical address of the flipped 8-byte word, `bitmask` marks the
/// flipped bits and `data` holds the value the word had before the flip.
#[derive(Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub struct BitFlip {
    /// Physical address of the word
    pub addr: PhysAddr,
    /// Set bits flipped
    pub bitmask: u64,
    /// Word content before the flip
    pub data: u64,
    /// DRAM coordinate of `addr`, if it was resolved
    pub dram: Option<DRAMAddr>,
}

/// Transition of the flipped bits of one word.
#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
pub enum FlipDirection {
    /// A single 0 became 1
    ZeroToOne,
    /// A single 1 became 0
    OneToZero,
    /// Several bits flipped, one entry per bit from the least significant up
    Multiple(Vec<FlipDirection>),
    /// Empty bitmask
    None,
}

impl core::fmt::Debug for BitFlip {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BitFlip")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("bitmask", &format_args!("{:#x}", self.bitmask))
            .field("data", &format_args!("{:#x}", self.data))
            .field("dram", &self.dram)
            .finish()
    }
}

impl BitFlip {
    /// A flip without DRAM coordinate.
    pub fn new(addr: PhysAddr, bitmask: u64, data: u64) -> Self {
        BitFlip {
            addr,
            bitmask,
            data,
            dram: None,
        }
    }

    /// Resolves the DRAM coordinate of this flip with the given configuration.
    pub fn locate(mut self, mem_config: &MemConfiguration) -> Self {
        self.dram = Some(DRAMAddr::from_phys(self.addr, mem_config));
        self
    }

    /// Which way the flipped bits went, judged from the pre-flip `data`.
    pub fn flip_direction(&self) -> FlipDirection {
        let direction = |bit: u64| {
            if self.data & bit != 0 {
                FlipDirection::OneToZero
            } else {
                FlipDirection::ZeroToOne
            }
        };
        match self.bitmask.count_ones() {
            0 => FlipDirection::None,
            1 => direction(self.bitmask),
            2.. => FlipDirection::Multiple(
                (0..u64::BITS)
                    .map(|i| 1 << i)
                    .filter(|bit| self.bitmask & bit != 0)
                    .map(direction)
                    .collect(),
            ),
        }
    }
}

/// Address functions of the desktop platform used throughout the unit tests.
#[cfg(test)]
pub(crate) fn desktop_functions() -> AddressFunctions {
    AddressFunctions::new(30, 0x3ff80000, 0x1fff)
        .bank_fns(&[0x4080, 0x88000, 0x110000, 0x220000, 0x440000, 0x4b300])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_direction() {
        assert_eq!(
            BitFlip::new(0x1000, 0b1, 0b1).flip_direction(),
            FlipDirection::OneToZero
        );
        assert_eq!(
            BitFlip::new(0x1000, 0b10, 0b01).flip_direction(),
            FlipDirection::ZeroToOne
        );
        assert_eq!(
            BitFlip::new(0x1000, 1 << 63 | 1, 1).flip_direction(),
            FlipDirection::Multiple(vec![FlipDirection::OneToZero, FlipDirection::ZeroToOne])
        );
        assert_eq!(BitFlip::new(0, 0, 0).flip_direction(), FlipDirection::None);
    }

    #[test]
    fn test_locate() {
        let config = MemConfiguration::from_functions(&desktop_functions()).unwrap();
        let dram = DRAMAddr::new(3, 100, 8);
        let flip = BitFlip::new(dram.to_phys(&config), 0x4, 0x0).locate(&config);
        assert_eq!(flip.dram, Some(dram));
    }
}

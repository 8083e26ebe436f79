//! The contract between pitch and a timed-access driver.
//!
//! This module defines the [`HammerDriver`] trait that all drivers must implement. A
//! driver owns a memory region, performs the refresh-synchronised access loop for a
//! [`HammerRequest`] and scans address ranges for bit flips afterwards.
//!
//! Addresses passed across this boundary are physical addresses in the platform's
//! address space (see [`MemConfiguration`]). Drivers relocate them into their own
//! buffers.
use crate::memory::{BitFlip, DRAMAddr, MemConfiguration, PhysAddr};
use crate::pattern::SignalError;
use crate::util::Rng;
use log::{debug, warn};
use rand::Rng as _;
use thiserror::Error;

/// Flip list capacity of the native driver.
pub const FLIP_LIST_CAPACITY: usize = 500;

/// Arguments of one timed-access call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HammerRequest {
    /// Address used to align the access loop to a refresh boundary
    pub sync_addr: PhysAddr,
    /// The signal, one physical address per activation slot
    pub addrs: Vec<PhysAddr>,
    /// Repetitions of the whole signal
    pub rounds: usize,
    /// Accesses between two refresh synchronisations
    pub act_per_ref: usize,
}

impl HammerRequest {
    /// Total number of accesses the request issues.
    pub fn total_accesses(&self) -> usize {
        self.addrs.len() * self.rounds
    }
}

/// Bounded list of flips returned by a scan.
///
/// Drivers stop recording at `capacity`. A full list may have dropped flips, which is
/// reported as a possible undercount, not as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlipList {
    flips: Vec<BitFlip>,
    capacity: usize,
}

impl FlipList {
    /// An empty list with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        FlipList {
            flips: Vec::with_capacity(capacity.min(FLIP_LIST_CAPACITY)),
            capacity,
        }
    }

    /// Builds a list from the driver's flips, truncating to `capacity`.
    pub fn from_flips(mut flips: Vec<BitFlip>, capacity: usize) -> Self {
        flips.truncate(capacity);
        FlipList { flips, capacity }
    }

    /// Records a flip. Returns `false` if the list is full and the flip was dropped.
    pub fn push(&mut self, flip: BitFlip) -> bool {
        if self.is_full() {
            return false;
        }
        self.flips.push(flip);
        true
    }

    /// Whether the list reached its capacity.
    pub fn is_full(&self) -> bool {
        self.flips.len() >= self.capacity
    }

    /// Whether the scan may have found more flips than the list holds.
    pub fn possibly_truncated(&self) -> bool {
        self.is_full()
    }

    /// The recorded flips.
    pub fn flips(&self) -> &[BitFlip] {
        &self.flips
    }

    /// Number of recorded flips.
    pub fn len(&self) -> usize {
        self.flips.len()
    }

    /// Whether no flip was recorded.
    pub fn is_empty(&self) -> bool {
        self.flips.is_empty()
    }

    /// Consumes the list.
    pub fn into_flips(self) -> Vec<BitFlip> {
        self.flips
    }
}

/// Errors reported by drivers.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum DriverError {
    #[error("driver initialization failed with status {0}")]
    Init(i32),
    #[error("driver is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("address {addr:#x} is outside of the driver buffer of {len:#x} bytes")]
    OutOfBounds { addr: PhysAddr, len: usize },
    #[error("driver translates {dram} to {driver:#x}, the resolver to {core:#x}")]
    TranslationMismatch {
        dram: DRAMAddr,
        core: PhysAddr,
        driver: PhysAddr,
    },
    #[error("driver maps {phys:#x} to {driver}, the resolver to {core}")]
    ReverseTranslationMismatch {
        phys: PhysAddr,
        core: DRAMAddr,
        driver: DRAMAddr,
    },
}

/// Failure of one hammering attempt.
#[derive(Debug, Error)]
pub enum HammerError<E: std::error::Error + 'static> {
    /// The instance could not be materialized
    #[error(transparent)]
    Signal(#[from] SignalError),
    /// The driver failed during hammer or scan
    #[error("driver error: {0}")]
    Driver(#[source] E),
}

/// Trait for timed-access drivers.
///
/// A driver exposes the call contract of the native access engine: one-time
/// initialization, address translation, the timed access loop and the flip scan.
/// Hammer and scan take `&mut self`, so calls for different instances on the same
/// driver can never interleave.
///
/// # Examples
///
/// See `pitch-hammerlib` for the native driver and `pitch-dummy` for a simulation.
pub trait HammerDriver {
    /// The error type returned by driver operations.
    type Error: std::error::Error + 'static;

    /// One-time initialization of the memory subsystem.
    ///
    /// # Errors
    ///
    /// A failed initialization is fatal; no other method may be used afterwards.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// The platform configuration the driver translates with.
    fn mem_config(&self) -> &MemConfiguration;

    /// Translates a DRAM coordinate to a physical address.
    fn translate_to_physical(&self, addr: &DRAMAddr) -> PhysAddr {
        addr.to_phys(self.mem_config())
    }

    /// Translates a physical address to a DRAM coordinate.
    fn translate_to_dram(&self, addr: PhysAddr) -> DRAMAddr {
        DRAMAddr::from_phys(addr, self.mem_config())
    }

    /// Performs the timed access loop. Blocks until all rounds completed.
    fn hammer(&mut self, request: &HammerRequest) -> Result<(), Self::Error>;

    /// Scans `[min(begin, end), max(begin, end))` for bit flips and restores the
    /// flipped words.
    fn scan(&mut self, begin: PhysAddr, end: PhysAddr) -> Result<FlipList, Self::Error>;

    /// Maximum number of flips a single scan reports.
    fn flip_capacity(&self) -> usize {
        FLIP_LIST_CAPACITY
    }
}

/// Checks that the driver's translation agrees with `mem_config` bit for bit.
///
/// Compares both directions on the origin, the last coordinate of every field, and
/// `samples` random coordinates.
///
/// # Errors
///
/// Returns the first disagreement found.
pub fn verify_translation<D: HammerDriver + ?Sized>(
    driver: &D,
    mem_config: &MemConfiguration,
    rng: &mut Rng,
    samples: usize,
) -> Result<(), DriverError> {
    let last = DRAMAddr {
        subchannel: mem_config.subchannel.mask as usize,
        rank: mem_config.rank.mask as usize,
        bank_group: mem_config.bank_group.mask as usize,
        bank: mem_config.bank.mask as usize,
        row: mem_config.row.mask as usize,
        col: mem_config.col.mask as usize,
    };
    let random = (0..samples).map(|_| {
        DRAMAddr::delinearize(
            rng.random_range(0..=mem_config.address_mask()),
            mem_config,
        )
    });
    for dram in [DRAMAddr::default(), last].into_iter().chain(random) {
        let core = dram.to_phys(mem_config);
        let driver_phys = driver.translate_to_physical(&dram);
        if core != driver_phys {
            return Err(DriverError::TranslationMismatch {
                dram,
                core,
                driver: driver_phys,
            });
        }
        let driver_dram = driver.translate_to_dram(core);
        if driver_dram != dram {
            return Err(DriverError::ReverseTranslationMismatch {
                phys: core,
                core: dram,
                driver: driver_dram,
            });
        }
    }
    debug!("Driver translation verified on {} coordinates", samples + 2);
    Ok(())
}

/// Logs a warning if `flips` may be incomplete.
pub(crate) fn check_undercount(flips: &FlipList, begin: PhysAddr, end: PhysAddr) -> bool {
    let truncated = flips.possibly_truncated();
    if truncated {
        warn!(
            "Flip list full ({} flips) for scan {:#x}..{:#x}, flip count is a lower bound",
            flips.len(),
            begin,
            end
        );
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::desktop_functions;

    struct Skewed {
        config: MemConfiguration,
        flip_bit: u64,
    }

    impl HammerDriver for Skewed {
        type Error = DriverError;

        fn init(&mut self) -> Result<(), DriverError> {
            Ok(())
        }

        fn mem_config(&self) -> &MemConfiguration {
            &self.config
        }

        fn translate_to_physical(&self, addr: &DRAMAddr) -> PhysAddr {
            addr.to_phys(&self.config) ^ self.flip_bit
        }

        fn hammer(&mut self, _request: &HammerRequest) -> Result<(), DriverError> {
            Ok(())
        }

        fn scan(&mut self, _begin: PhysAddr, _end: PhysAddr) -> Result<FlipList, DriverError> {
            Ok(FlipList::with_capacity(self.flip_capacity()))
        }
    }

    #[test]
    fn test_verify_translation() {
        let config = MemConfiguration::from_functions(&desktop_functions()).unwrap();
        let mut rng = Rng::from_seed(3);
        let exact = Skewed {
            config,
            flip_bit: 0,
        };
        verify_translation(&exact, &config, &mut rng, 100).unwrap();
        let skewed = Skewed {
            config,
            flip_bit: 1 << 14,
        };
        assert!(matches!(
            verify_translation(&skewed, &config, &mut rng, 100),
            Err(DriverError::TranslationMismatch { .. })
        ));
    }

    #[test]
    fn test_flip_list_capacity() {
        let mut list = FlipList::with_capacity(2);
        assert!(list.push(BitFlip::new(0x10, 1, 0)));
        assert!(!list.possibly_truncated());
        assert!(list.push(BitFlip::new(0x18, 1, 0)));
        assert!(!list.push(BitFlip::new(0x20, 1, 0)));
        assert_eq!(list.len(), 2);
        assert!(list.possibly_truncated());
        assert!(check_undercount(&list, 0, 0x100));

        let truncated = FlipList::from_flips(vec![BitFlip::new(0, 1, 0); 5], 3);
        assert_eq!(truncated.flips().len(), 3);
    }

    #[test]
    fn test_request_accesses() {
        let request = HammerRequest {
            sync_addr: 0,
            addrs: vec![0x1000, 0x2000, 0x3000],
            rounds: 4,
            act_per_ref: 170,
        };
        assert_eq!(request.total_accesses(), 12);
    }
}

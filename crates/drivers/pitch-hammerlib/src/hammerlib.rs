use crate::buffer::{self, HugeBuffer};
use log::{debug, info, warn};
use pitch_core::hammerer::{DriverError, FLIP_LIST_CAPACITY, FlipList, HammerDriver, HammerRequest};
use pitch_core::memory::{MemConfiguration, PhysAddr};
use pitch_core::util::{BASE_MSB, HUGEPAGE_SIZE, WORD_SIZE};
use std::arch::asm;
use std::arch::x86_64::{__rdtscp, _mm_mfence};
use std::time::Duration;

/// Access latency in cycles above which a read is taken to have hit a refresh.
pub const DEFAULT_SYNC_THRESHOLD: u64 = 900;

/// Timed reads before giving up on one refresh synchronisation
const MAX_SYNC_ATTEMPTS: usize = 1 << 20;

/// Pause between warm-up and the first synchronisation
const SETTLE_TIME: Duration = Duration::from_micros(64);

/// The native refresh-synchronised driver.
///
/// Owns a 1 GiB hugepage at [`BASE_MSB`]. Physical offsets received through
/// [`HammerDriver`] are taken relative to the start of the hugepage.
pub struct HammerLib {
    config: MemConfiguration,
    buffer: Option<HugeBuffer>,
    seed: u64,
    sync_threshold: u64,
    capacity: usize,
}

impl HammerLib {
    /// Creates an uninitialized driver. `seed` keys the expected buffer content.
    pub fn new(config: MemConfiguration, seed: u64) -> Self {
        HammerLib {
            config,
            buffer: None,
            seed,
            sync_threshold: DEFAULT_SYNC_THRESHOLD,
            capacity: FLIP_LIST_CAPACITY,
        }
    }

    /// Sets the refresh detection threshold in cycles.
    pub fn with_sync_threshold(mut self, cycles: u64) -> Self {
        self.sync_threshold = cycles;
        self
    }

    fn buffer(&self) -> Result<&HugeBuffer, DriverError> {
        self.buffer.as_ref().ok_or(DriverError::NotInitialized)
    }

    fn resolve(&self, addr: PhysAddr) -> Result<*const u8, DriverError> {
        let buffer = self.buffer()?;
        buffer.ptr(addr).ok_or(DriverError::OutOfBounds {
            addr,
            len: buffer.len(),
        })
    }

    /// Spins until an access to `ptr` is slow enough to have collided with a refresh.
    ///
    /// Returns the number of timed reads, or `None` if no refresh was observed.
    fn refresh_sync(&self, ptr: *const u8) -> Option<usize> {
        let mut aux = 0;
        for attempt in 1..=MAX_SYNC_ATTEMPTS {
            let dt = unsafe {
                let t0 = __rdtscp(&mut aux);
                std::ptr::read_volatile(ptr);
                let dt = __rdtscp(&mut aux) - t0;
                clflushopt(ptr);
                dt
            };
            if dt > self.sync_threshold {
                return Some(attempt);
            }
        }
        None
    }
}

/// Whether to re-synchronise with refresh after the access at `slot` of a round.
///
/// The count restarts with every round, so the sync points sit at the same signal
/// slots in each repetition.
fn resync_after(slot: usize, act_per_ref: usize) -> bool {
    act_per_ref != 0 && (slot + 1) % act_per_ref == 0
}

#[inline(always)]
unsafe fn clflushopt(ptr: *const u8) {
    unsafe { asm!("clflushopt [{}]", in(reg) ptr) };
}

impl HammerDriver for HammerLib {
    type Error = DriverError;

    fn init(&mut self) -> Result<(), DriverError> {
        if self.buffer.is_some() {
            return Ok(());
        }
        let span = self.config.address_span();
        if span > HUGEPAGE_SIZE {
            warn!(
                "Address space of {:#x} bytes exceeds the hugepage of {:#x} bytes",
                span, HUGEPAGE_SIZE
            );
            return Err(DriverError::Init(libc::EINVAL));
        }
        let mut buffer = HugeBuffer::map(BASE_MSB, HUGEPAGE_SIZE)?;
        buffer::fill(buffer.words_mut(), 0, self.seed);
        info!(
            "Initialized hugepage at {:#x} with seed {:#x}",
            BASE_MSB, self.seed
        );
        self.buffer = Some(buffer);
        Ok(())
    }

    fn mem_config(&self) -> &MemConfiguration {
        &self.config
    }

    fn hammer(&mut self, request: &HammerRequest) -> Result<(), DriverError> {
        let sync = self.resolve(request.sync_addr)?;
        let ptrs = request
            .addrs
            .iter()
            .map(|&addr| self.resolve(addr))
            .collect::<Result<Vec<_>, _>>()?;
        if ptrs.is_empty() {
            return Ok(());
        }

        for &ptr in &ptrs {
            unsafe { std::ptr::read_volatile(ptr) };
        }
        std::thread::sleep(SETTLE_TIME);
        if self.refresh_sync(sync).is_none() {
            warn!(
                "No refresh observed on sync address {:#x}",
                request.sync_addr
            );
        }

        let mut missed = 0usize;
        for _ in 0..request.rounds {
            for (slot, &ptr) in ptrs.iter().enumerate() {
                unsafe {
                    std::ptr::read_volatile(ptr);
                    clflushopt(ptr);
                }
                if resync_after(slot, request.act_per_ref) && self.refresh_sync(ptr).is_none() {
                    missed += 1;
                }
            }
        }
        unsafe { _mm_mfence() };
        if missed > 0 {
            warn!("{} refresh synchronisation(s) timed out", missed);
        }
        debug!(
            "Hammered {} accesses over {} rounds",
            request.total_accesses(),
            request.rounds
        );
        Ok(())
    }

    fn scan(&mut self, begin: PhysAddr, end: PhysAddr) -> Result<FlipList, DriverError> {
        let capacity = self.capacity;
        let seed = self.seed;
        let buffer = self.buffer.as_mut().ok_or(DriverError::NotInitialized)?;
        let (lo, hi) = (begin.min(end), begin.max(end));
        if hi as usize > buffer.len() {
            return Err(DriverError::OutOfBounds {
                addr: hi,
                len: buffer.len(),
            });
        }
        let first = lo as usize / WORD_SIZE;
        let last = (hi as usize).div_ceil(WORD_SIZE);
        let mut flips = FlipList::with_capacity(capacity);
        let found = buffer::check_and_restore(
            &mut buffer.words_mut()[first..last],
            (first * WORD_SIZE) as u64,
            seed,
            &mut flips,
        );
        debug!(
            "Scanned {:#x}..{:#x}: {} flipped word(s)",
            lo, hi, found
        );
        Ok(flips)
    }

    fn flip_capacity(&self) -> usize {
        self.capacity
    }
}

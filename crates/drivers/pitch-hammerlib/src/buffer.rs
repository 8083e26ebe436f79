use log::{debug, trace};
use pitch_core::hammerer::FlipList;
use pitch_core::memory::{BitFlip, PhysAddr};
use pitch_core::util::WORD_SIZE;
use std::io;

/// A 1 GiB hugepage mapped at a fixed virtual address.
///
/// Unmapped on drop.
pub(crate) struct HugeBuffer {
    ptr: *mut u8,
    len: usize,
}

impl HugeBuffer {
    /// Maps `len` bytes of 1 GiB hugepages at `base`.
    pub fn map(base: u64, len: usize) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                base as *mut libc::c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_FIXED
                    | libc::MAP_ANONYMOUS
                    | libc::MAP_PRIVATE
                    | libc::MAP_POPULATE
                    | libc::MAP_HUGETLB
                    | libc::MAP_HUGE_1GB,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        debug!("Mapped {} bytes of hugepages at {:p}", len, ptr);
        Ok(HugeBuffer {
            ptr: ptr as *mut u8,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Pointer to the byte at `offset`, if inside the buffer.
    pub fn ptr(&self, offset: PhysAddr) -> Option<*const u8> {
        let offset = usize::try_from(offset).ok()?;
        if offset >= self.len {
            return None;
        }
        Some(unsafe { self.ptr.add(offset) } as *const u8)
    }

    /// The buffer as 64-bit words.
    pub fn words_mut(&mut self) -> &mut [u64] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr as *mut u64, self.len / WORD_SIZE) }
    }
}

impl Drop for HugeBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

/// Expected content of the word at `offset`.
///
/// A splitmix64 finalizer over the seeded offset, so every word holds a distinct,
/// reproducible value and a flip in any bit position is detectable.
pub(crate) fn expected_word(seed: u64, offset: PhysAddr) -> u64 {
    let mut z = (seed ^ offset).wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Fills `words` with their expected values. `words[0]` lives at `first`.
pub(crate) fn fill(words: &mut [u64], first: PhysAddr, seed: u64) {
    for (i, word) in words.iter_mut().enumerate() {
        *word = expected_word(seed, first + (i * WORD_SIZE) as u64);
    }
}

/// Compares `words` against their expected values, records deviations in `flips` and
/// restores them. `words[0]` lives at `first`.
///
/// Words are restored even if `flips` is full. Returns the number of flipped words.
pub(crate) fn check_and_restore(
    words: &mut [u64],
    first: PhysAddr,
    seed: u64,
    flips: &mut FlipList,
) -> usize {
    let mut found = 0;
    for (i, word) in words.iter_mut().enumerate() {
        let addr = first + (i * WORD_SIZE) as u64;
        let expected = expected_word(seed, addr);
        let value = unsafe { std::ptr::read_volatile(word) };
        let bitmask = value ^ expected;
        if bitmask == 0 {
            continue;
        }
        trace!("Flip at {:#x}: {:#018x}", addr, bitmask);
        found += 1;
        flips.push(BitFlip::new(addr, bitmask, expected));
        unsafe { std::ptr::write_volatile(word, expected) };
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_word_distinct() {
        let a = expected_word(1, 0);
        assert_eq!(a, expected_word(1, 0));
        assert_ne!(a, expected_word(1, 8));
        assert_ne!(a, expected_word(2, 0));
    }

    #[test]
    fn test_clean_region() {
        let mut words = vec![0u64; 64];
        fill(&mut words, 0x1000, 7);
        let mut flips = FlipList::with_capacity(10);
        assert_eq!(check_and_restore(&mut words, 0x1000, 7, &mut flips), 0);
        assert!(flips.is_empty());
    }

    #[test]
    fn test_detects_and_restores() {
        let mut words = vec![0u64; 64];
        fill(&mut words, 0x1000, 7);
        let pristine = words.clone();
        words[3] ^= 1 << 17;
        words[40] ^= 0b11;
        let mut flips = FlipList::with_capacity(10);
        assert_eq!(check_and_restore(&mut words, 0x1000, 7, &mut flips), 2);
        assert_eq!(words, pristine);
        assert_eq!(flips.flips()[0].addr, 0x1000 + 3 * 8);
        assert_eq!(flips.flips()[0].bitmask, 1 << 17);
        assert_eq!(flips.flips()[0].data, pristine[3]);
        assert_eq!(flips.flips()[1].addr, 0x1000 + 40 * 8);
        assert_eq!(flips.flips()[1].bitmask, 0b11);
    }

    #[test]
    fn test_full_list_still_restores() {
        let mut words = vec![0u64; 16];
        fill(&mut words, 0, 3);
        let pristine = words.clone();
        for w in words.iter_mut() {
            *w = !*w;
        }
        let mut flips = FlipList::with_capacity(4);
        assert_eq!(check_and_restore(&mut words, 0, 3, &mut flips), 16);
        assert_eq!(flips.len(), 4);
        assert!(flips.possibly_truncated());
        assert_eq!(words, pristine);
    }
}

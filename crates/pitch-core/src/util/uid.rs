const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over little-endian 64-bit words, folded to 32 bits.
///
/// Record identifiers are hashed with this instead of the std hasher so they stay
/// the same across toolchains and platforms.
#[derive(Debug, Clone, Copy)]
pub struct UidHasher(u64);

impl Default for UidHasher {
    fn default() -> Self {
        UidHasher(FNV_OFFSET)
    }
}

impl UidHasher {
    /// Feeds one word.
    pub fn word(mut self, value: u64) -> Self {
        for byte in value.to_le_bytes() {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
        self
    }

    /// Feeds a signed word, sign-extended.
    pub fn signed(self, value: i64) -> Self {
        self.word(value as u64)
    }

    /// The 32-bit identifier.
    pub fn finish(self) -> u32 {
        (self.0 ^ (self.0 >> 32)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(UidHasher::default().finish(), 0x4fd0_bfc1);
        let words = [680, 170, 3, 113, 2, 0, 2];
        let h = words.iter().fold(UidHasher::default(), |h, &w| h.word(w));
        assert_eq!(h.finish(), 0x8753_2cb2);
        assert_eq!(h.word(4).finish(), 0x4e41_fa9e);
    }

    #[test]
    fn test_sign_extension() {
        assert_eq!(
            UidHasher::default().signed(-2).finish(),
            UidHasher::default().word(u64::MAX - 1).finish()
        );
    }
}

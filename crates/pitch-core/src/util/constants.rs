/// Length of the refresh window tREFW in microseconds (64 ms)
pub const REFRESH_WINDOW_US: f64 = 64_000.0;
/// Average refresh command interval tREFI in microseconds
pub const REFRESH_INTERVAL_US: f64 = 7.8;
/// Number of REF commands in one refresh window
pub const REFS_PER_RI: usize = (REFRESH_WINDOW_US / REFRESH_INTERVAL_US) as usize;

/// Maximum number of REF intervals spanned by one pattern period
pub const MAX_REFS: usize = 4;
/// Maximum number of activations that fit between two REF commands
pub const MAX_ACT_PER_REF: usize = 170;
/// Share of all activations in a refresh window dedicated to the aggressors
pub const AGGRESSOR_ACT_RATIO: f64 = 0.1;

/// Number of rows per bank considered for filler rows
pub const MAX_ROWS: usize = 8192;
/// Rows on either side of an aggressor that filler rows must avoid
pub const GUARD_ROW_CNT: usize = 5;
/// Row offset of the synchronisation row from the first aggressor
pub const SYNC_ROW_OFFSET: usize = 10;
/// Rows scanned beyond the outermost aggressors
pub const SCAN_MARGIN: usize = 5;
/// Multiple of the activation budget that one hammer call issues
pub const ROUND_FACTOR: usize = 4;
/// Filler draws per slot before giving up
pub const MAX_FILLER_ATTEMPTS: usize = 10_000;

/// Size of one access in the flip scan (bytes)
pub const WORD_SIZE: usize = 8;
/// Cache line size (64 bytes) for x86_64
pub const CL_SIZE: usize = 64;
/// Standard page size (4096 bytes)
pub const PAGE_SIZE: usize = 4096;
/// Size of a 1 GiB hugepage
pub const HUGEPAGE_SIZE: usize = 1 << 30;
/// Base address for the hugepage buffer of the native driver
pub const BASE_MSB: u64 = 0x2_0000_0000;

use crate::memory::gf2::{AddressMatrix, BitFunction, MAX_MTX_SIZE, low_mask};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in the platform address configuration.
///
/// Any of these is fatal: no pattern may be generated against a platform whose
/// address mapping failed to resolve.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigurationError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("address width must not be zero")]
    ZeroWidth,
    #[error("address width {0} exceeds the supported maximum of {MAX_MTX_SIZE} bits")]
    WidthTooLarge(usize),
    #[error("address functions define {rows} bits, but the address width is {size}")]
    WidthMismatch { size: usize, rows: usize },
    #[error("bit function {mask:#x} selects bits outside of the {size}-bit address space")]
    FunctionOutOfRange { mask: BitFunction, size: usize },
    #[error("empty bit function in {0} functions")]
    EmptyFunction(&'static str),
    #[error("invalid bit definition: {0}")]
    InvalidBitDef(String),
    #[error("address matrix is singular (no pivot for column {column})")]
    Singular { column: usize },
    #[error("forward matrix times inverse differs from the identity in row {row}")]
    InverseMismatch { row: usize },
}

/// Defines which physical address bits are used for one DRAM function.
///
/// Can specify a single bit, a list of bits XORed together, or a hexadecimal mask
/// string such as `"0x4080"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BitDef {
    /// Single bit function
    Single(u64),
    /// XOR of multiple bits
    Multi(Vec<u64>),
    /// Hexadecimal bit mask
    Mask(String),
}

impl BitDef {
    /// Bit definition selecting the set bits of `mask`.
    pub fn from_mask(mask: BitFunction) -> Self {
        BitDef::Multi(
            (0..u64::BITS as u64)
                .filter(|bit| (mask >> bit) & 1 == 1)
                .collect(),
        )
    }

    /// Converts bit definition to a bitmask.
    ///
    /// # Errors
    ///
    /// Fails for bit indices beyond 63 and for malformed mask strings.
    pub fn to_bitstr(&self) -> Result<BitFunction, ConfigurationError> {
        let bit = |b: u64| {
            1u64.checked_shl(b as u32)
                .filter(|_| b < u64::BITS as u64)
                .ok_or_else(|| ConfigurationError::InvalidBitDef(format!("bit index {}", b)))
        };
        match self {
            BitDef::Single(b) => bit(*b),
            BitDef::Multi(bits) => bits
                .iter()
                .try_fold(0, |acc, &b| -> Result<BitFunction, ConfigurationError> {
                    Ok(acc | bit(b)?)
                }),
            BitDef::Mask(s) => {
                let digits = s
                    .strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .unwrap_or(s);
                BitFunction::from_str_radix(digits, 16)
                    .map_err(|e| ConfigurationError::InvalidBitDef(format!("{}: {}", s, e)))
            }
        }
    }
}

/// The bit functions describing one platform's physical-to-DRAM mapping.
///
/// Row and column masks contribute one geometry bit per set bit. Every entry of the
/// function lists contributes exactly one geometry bit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFunctions {
    /// Physical address width covered by the mapping
    pub size: usize,
    /// Physical bits selecting the row
    pub row_mask: BitDef,
    /// Physical bits selecting the column
    pub col_mask: BitDef,
    /// Bank functions
    #[serde(default)]
    pub bank_fns: Vec<BitDef>,
    /// Bank group functions
    #[serde(default)]
    pub bank_group_fns: Vec<BitDef>,
    /// Rank functions
    #[serde(default)]
    pub rank_fns: Vec<BitDef>,
    /// Sub-channel functions
    #[serde(default)]
    pub subchannel_fns: Vec<BitDef>,
}

impl AddressFunctions {
    /// Address functions with the given row and column masks and no bank functions.
    pub fn new(size: usize, row_mask: BitFunction, col_mask: BitFunction) -> Self {
        AddressFunctions {
            size,
            row_mask: BitDef::from_mask(row_mask),
            col_mask: BitDef::from_mask(col_mask),
            bank_fns: vec![],
            bank_group_fns: vec![],
            rank_fns: vec![],
            subchannel_fns: vec![],
        }
    }

    /// Sets the bank functions.
    pub fn bank_fns(mut self, fns: &[BitFunction]) -> Self {
        self.bank_fns = fns.iter().map(|&f| BitDef::from_mask(f)).collect();
        self
    }

    /// Sets the bank group functions.
    pub fn bank_group_fns(mut self, fns: &[BitFunction]) -> Self {
        self.bank_group_fns = fns.iter().map(|&f| BitDef::from_mask(f)).collect();
        self
    }

    /// Sets the rank functions.
    pub fn rank_fns(mut self, fns: &[BitFunction]) -> Self {
        self.rank_fns = fns.iter().map(|&f| BitDef::from_mask(f)).collect();
        self
    }

    /// Sets the sub-channel functions.
    pub fn subchannel_fns(mut self, fns: &[BitFunction]) -> Self {
        self.subchannel_fns = fns.iter().map(|&f| BitDef::from_mask(f)).collect();
        self
    }
}

fn resolve_fns(
    name: &'static str,
    defs: &[BitDef],
) -> Result<Vec<BitFunction>, ConfigurationError> {
    defs.iter()
        .map(|def| match def.to_bitstr()? {
            0 => Err(ConfigurationError::EmptyFunction(name)),
            mask => Ok(mask),
        })
        .collect()
}

/// Splits a mask into one single-bit function per set bit, highest bit first.
fn split_mask(mask: BitFunction) -> Vec<BitFunction> {
    (0..u64::BITS)
        .rev()
        .filter(|bit| (mask >> bit) & 1 == 1)
        .map(|bit| 1 << bit)
        .collect()
}

/// Position of one geometry field inside the linearized DRAM coordinate.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    /// Bit shift of the field
    pub shift: usize,
    /// Bit mask of the field (applied after shifting)
    pub mask: u64,
}

impl FieldLayout {
    fn new(shift: usize, bits: usize) -> Self {
        FieldLayout {
            shift,
            mask: low_mask(bits),
        }
    }

    /// Number of bits in this field.
    pub fn bits(&self) -> usize {
        self.mask.count_ones() as usize
    }

    /// Number of values the field can hold, saturating at `usize::MAX`.
    pub fn count(&self) -> usize {
        field_count(self.bits())
    }

    /// Extracts the field from a linearized coordinate.
    pub fn extract(&self, linear: u64) -> usize {
        (linear.checked_shr(self.shift as u32).unwrap_or(0) & self.mask) as usize
    }

    /// Places `value` at the field position, dropping bits that do not fit.
    pub fn insert(&self, value: usize) -> u64 {
        (value as u64 & self.mask)
            .checked_shl(self.shift as u32)
            .unwrap_or(0)
    }
}

/// DRAM addressing configuration of one platform.
///
/// Defines how physical addresses map to the DRAM organization (sub-channel, rank,
/// bank group, bank, row, column) through a forward matrix, and back through its
/// GF(2) inverse. The linearized DRAM coordinate holds the column in the lowest
/// bits, followed by row, bank, bank group, rank and sub-channel.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemConfiguration {
    /// Physical address width covered by the matrices
    pub size: usize,
    /// Sub-channel field
    pub subchannel: FieldLayout,
    /// Rank field
    pub rank: FieldLayout,
    /// Bank group field
    pub bank_group: FieldLayout,
    /// Bank field
    pub bank: FieldLayout,
    /// Row field
    pub row: FieldLayout,
    /// Column field
    pub col: FieldLayout,
    /// DRAM addressing matrix (physical to DRAM)
    pub dram_mtx: AddressMatrix,
    /// Address reconstruction matrix (DRAM to physical)
    pub addr_mtx: AddressMatrix,
}

impl MemConfiguration {
    /// Resolves the forward and inverse matrices from bit functions.
    ///
    /// # Errors
    ///
    /// Fails if the functions do not define exactly `size` bits, if a function uses
    /// bits outside of the address space, or if the resulting matrix is not
    /// invertible over GF(2).
    pub fn from_functions(funcs: &AddressFunctions) -> Result<Self, ConfigurationError> {
        let size = funcs.size;
        if size == 0 {
            return Err(ConfigurationError::ZeroWidth);
        }
        if size > MAX_MTX_SIZE {
            return Err(ConfigurationError::WidthTooLarge(size));
        }
        let subch_fns = resolve_fns("sub-channel", &funcs.subchannel_fns)?;
        let rank_fns = resolve_fns("rank", &funcs.rank_fns)?;
        let bg_fns = resolve_fns("bank group", &funcs.bank_group_fns)?;
        let bank_fns = resolve_fns("bank", &funcs.bank_fns)?;
        let row_fns = split_mask(funcs.row_mask.to_bitstr()?);
        let col_fns = split_mask(funcs.col_mask.to_bitstr()?);

        let col = FieldLayout::new(0, col_fns.len());
        let row = FieldLayout::new(col.shift + col_fns.len(), row_fns.len());
        let bank = FieldLayout::new(row.shift + row_fns.len(), bank_fns.len());
        let bank_group = FieldLayout::new(bank.shift + bank_fns.len(), bg_fns.len());
        let rank = FieldLayout::new(bank_group.shift + bg_fns.len(), rank_fns.len());
        let subchannel = FieldLayout::new(rank.shift + rank_fns.len(), subch_fns.len());

        // most significant output bit first
        let rows = [subch_fns, rank_fns, bg_fns, bank_fns, row_fns, col_fns].concat();
        if rows.len() != size {
            return Err(ConfigurationError::WidthMismatch {
                size,
                rows: rows.len(),
            });
        }
        if let Some(&mask) = rows.iter().find(|&&m| m & !low_mask(size) != 0) {
            return Err(ConfigurationError::FunctionOutOfRange { mask, size });
        }

        let dram_mtx = AddressMatrix::new(&rows)?;
        debug!("DRAM matrix: {:?}", dram_mtx);
        let addr_mtx = dram_mtx.inverse()?;
        debug!("address matrix: {:?}", addr_mtx);
        info!(
            "Resolved {}-bit mapping: {} bank, {} bank group, {} rank, {} sub-channel, {} row, {} column bits",
            size,
            bank.bits(),
            bank_group.bits(),
            rank.bits(),
            subchannel.bits(),
            row.bits(),
            col.bits()
        );
        Ok(MemConfiguration {
            size,
            subchannel,
            rank,
            bank_group,
            bank,
            row,
            col,
            dram_mtx,
            addr_mtx,
        })
    }

    /// Re-derives the inverse matrix and checks it against the stored one.
    ///
    /// Use this on configurations loaded from disk before trusting `addr_mtx`.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.dram_mtx.size() != self.size || self.addr_mtx.size() != self.size {
            return Err(ConfigurationError::WidthMismatch {
                size: self.size,
                rows: self.dram_mtx.size(),
            });
        }
        match self.dram_mtx.multiply(&self.addr_mtx).identity_mismatch() {
            None => Ok(()),
            Some(row) => Err(ConfigurationError::InverseMismatch { row }),
        }
    }
}

impl MemConfiguration {
    /// Returns the number of banks (including bank group, rank and sub-channel bits).
    ///
    /// Saturates at `usize::MAX` if the bank bits do not fit a `usize`.
    pub fn get_bank_count(&self) -> usize {
        field_count(
            self.bank.bits() + self.bank_group.bits() + self.rank.bits() + self.subchannel.bits(),
        )
    }

    /// Returns the number of rows covered by this DRAM configuration, saturating at
    /// `usize::MAX`.
    pub fn get_row_count(&self) -> usize {
        field_count(self.row.bits())
    }

    /// Returns the number of columns in this DRAM configuration, saturating at
    /// `usize::MAX`.
    pub fn get_col_count(&self) -> usize {
        field_count(self.col.bits())
    }

    /// Mask covering the configured address width.
    pub fn address_mask(&self) -> u64 {
        low_mask(self.size)
    }

    /// Bytes addressable with the configured width, saturating at `usize::MAX`.
    pub fn address_span(&self) -> usize {
        field_count(self.size)
    }
}

fn field_count(bits: usize) -> usize {
    u32::try_from(bits)
        .ok()
        .and_then(|bits| 1usize.checked_shl(bits))
        .unwrap_or(usize::MAX)
}

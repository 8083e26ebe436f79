//! Bit-matrix arithmetic over GF(2).
//!
//! An [`AddressMatrix`] stores one [`BitFunction`] per output bit. Applying the matrix
//! to a value computes, for every row, the parity of the bits selected by that row's
//! mask. The first row produces the most significant output bit, so row `i` of a
//! `size`-bit matrix yields output bit `size - 1 - i`. Column `j` of the conceptual
//! bit-matrix corresponds to input bit `size - 1 - j`.
//!
//! All operations use XOR/AND on integer masks; no floating point is involved.
use crate::memory::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};

/// Maximum supported address width in bits.
pub const MAX_MTX_SIZE: usize = 64;

/// A bit mask over physical address bits.
///
/// The bits selected by the mask are XORed together to produce one DRAM geometry bit.
pub type BitFunction = u64;

/// Returns a mask with the lowest `bits` bits set.
pub(crate) fn low_mask(bits: usize) -> u64 {
    if bits >= u64::BITS as usize {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Square bit-matrix over GF(2) with an explicit width.
///
/// The rows live in a fixed-length array, only the first [`size`](AddressMatrix::size)
/// entries are meaningful. On the wire the matrix is a list of exactly `size` masks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<BitFunction>", into = "Vec<BitFunction>")]
pub struct AddressMatrix {
    size: usize,
    rows: [BitFunction; MAX_MTX_SIZE],
}

impl AddressMatrix {
    /// Builds a `rows.len()` x `rows.len()` matrix.
    ///
    /// # Errors
    ///
    /// Fails if the matrix is empty, wider than [`MAX_MTX_SIZE`], or if a row selects
    /// bits outside of the `rows.len()`-bit input space.
    pub fn new(rows: &[BitFunction]) -> Result<Self, ConfigurationError> {
        let size = rows.len();
        if size == 0 {
            return Err(ConfigurationError::ZeroWidth);
        }
        if size > MAX_MTX_SIZE {
            return Err(ConfigurationError::WidthTooLarge(size));
        }
        let mut out = AddressMatrix {
            size,
            rows: [0; MAX_MTX_SIZE],
        };
        for (i, &row) in rows.iter().enumerate() {
            if row & !low_mask(size) != 0 {
                return Err(ConfigurationError::FunctionOutOfRange { mask: row, size });
            }
            out.rows[i] = row;
        }
        Ok(out)
    }

    /// The identity matrix of the given width.
    pub fn identity(size: usize) -> Result<Self, ConfigurationError> {
        let rows = (0..size).map(|i| 1 << (size - 1 - i)).collect::<Vec<_>>();
        AddressMatrix::new(&rows)
    }

    /// Width of the matrix in bits.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The row masks, most significant output bit first.
    pub fn rows(&self) -> &[BitFunction] {
        &self.rows[..self.size]
    }

    /// Entry at (`row`, `col`) of the conceptual bit-matrix.
    pub fn bit(&self, row: usize, col: usize) -> bool {
        (self.rows[row] >> (self.size - 1 - col)) & 1 == 1
    }

    /// Multiplies the matrix with the bit vector `value`.
    pub fn apply(&self, value: u64) -> u64 {
        let mut res = 0;
        for &f in self.rows() {
            res <<= 1;
            res |= ((value & f).count_ones() & 1) as u64;
        }
        res
    }

    /// Matrix product `self * other` modulo 2.
    ///
    /// Both matrices must have the same width.
    pub fn multiply(&self, other: &AddressMatrix) -> AddressMatrix {
        assert_eq!(self.size, other.size, "matrix widths differ");
        let mut out = AddressMatrix {
            size: self.size,
            rows: [0; MAX_MTX_SIZE],
        };
        for i in 0..self.size {
            for j in 0..self.size {
                if self.bit(i, j) {
                    out.rows[i] ^= other.rows[j];
                }
            }
        }
        out
    }

    /// Whether the matrix is the identity.
    pub fn is_identity(&self) -> bool {
        self.rows()
            .iter()
            .enumerate()
            .all(|(i, &row)| row == 1 << (self.size - 1 - i))
    }

    /// First row that differs from the identity, if any.
    pub(crate) fn identity_mismatch(&self) -> Option<usize> {
        self.rows()
            .iter()
            .enumerate()
            .position(|(i, &row)| row != 1 << (self.size - 1 - i))
    }

    /// Computes the inverse by Gauss-Jordan elimination over GF(2).
    ///
    /// The result is verified: `self * inverse` must be the identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Singular`] if no inverse exists and
    /// [`ConfigurationError::InverseMismatch`] if the verification fails.
    pub fn inverse(&self) -> Result<AddressMatrix, ConfigurationError> {
        let n = self.size;
        let mut left = self.rows;
        let mut right = AddressMatrix::identity(n)?.rows;

        for col in 0..n {
            let bit = 1 << (n - 1 - col);
            let pivot = (col..n)
                .find(|&r| left[r] & bit != 0)
                .ok_or(ConfigurationError::Singular { column: col })?;
            left.swap(col, pivot);
            right.swap(col, pivot);
            let (pivot_left, pivot_right) = (left[col], right[col]);
            for r in 0..n {
                if r != col && left[r] & bit != 0 {
                    left[r] ^= pivot_left;
                    right[r] ^= pivot_right;
                }
            }
        }

        let inv = AddressMatrix {
            size: n,
            rows: right,
        };
        match self.multiply(&inv).identity_mismatch() {
            None => Ok(inv),
            Some(row) => Err(ConfigurationError::InverseMismatch { row }),
        }
    }
}

struct BinRow(u64, usize);

impl Debug for BinRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#0w$b}", self.0, w = self.1 + 2)
    }
}

impl Debug for AddressMatrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rows().iter().map(|&row| BinRow(row, self.size)))
            .finish()
    }
}

impl TryFrom<Vec<BitFunction>> for AddressMatrix {
    type Error = ConfigurationError;

    fn try_from(rows: Vec<BitFunction>) -> Result<Self, Self::Error> {
        AddressMatrix::new(&rows)
    }
}

impl From<AddressMatrix> for Vec<BitFunction> {
    fn from(mtx: AddressMatrix) -> Self {
        mtx.rows().to_vec()
    }
}

/// Extracts a maximal linearly independent subset of `candidates`.
///
/// Candidates are processed in order. Each one is reduced against the pivots found
/// so far; if something remains, the remainder's highest bit becomes a new pivot, it
/// is XORed out of every other basis row sharing that bit, and the original mask is
/// recorded. Redundant candidates (linear combinations of earlier ones) and zero
/// masks are dropped.
pub fn independent_functions(candidates: &[BitFunction]) -> Vec<BitFunction> {
    let mut basis: Vec<(u64, u64)> = Vec::with_capacity(candidates.len());
    let mut independent = vec![];
    for &candidate in candidates {
        let mut reduced = candidate;
        for &(pivot, row) in basis.iter() {
            if reduced & pivot != 0 {
                reduced ^= row;
            }
        }
        if reduced == 0 {
            continue;
        }
        let pivot = 1 << (u64::BITS - 1 - reduced.leading_zeros());
        for (_, row) in basis.iter_mut() {
            if *row & pivot != 0 {
                *row ^= reduced;
            }
        }
        basis.push((pivot, reduced));
        independent.push(candidate);
    }
    independent
}

/// Rank of the given functions over GF(2).
pub fn rank(functions: &[BitFunction]) -> usize {
    independent_functions(functions).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Rng;
    use rand::Rng as _;

    #[test]
    fn test_identity_inverse() {
        let id = AddressMatrix::identity(30).unwrap();
        assert!(id.is_identity());
        assert_eq!(id.inverse().unwrap(), id);
    }

    #[test]
    fn test_inverse_small() {
        // b2 = a2 ^ a0, b1 = a1, b0 = a0
        let mtx = AddressMatrix::new(&[0b101, 0b010, 0b001]).unwrap();
        let inv = mtx.inverse().unwrap();
        assert_eq!(inv.rows(), &[0b101, 0b010, 0b001]);
        assert!(mtx.multiply(&inv).is_identity());
        assert!(inv.multiply(&mtx).is_identity());
    }

    #[test]
    fn test_singular() {
        let mtx = AddressMatrix::new(&[0b011, 0b011, 0b100]).unwrap();
        assert!(matches!(
            mtx.inverse(),
            Err(ConfigurationError::Singular { .. })
        ));
    }

    #[test]
    fn test_out_of_range_row() {
        assert!(matches!(
            AddressMatrix::new(&[0b1000, 0b01, 0b10]),
            Err(ConfigurationError::FunctionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = Rng::from_seed(0x5eed);
        let mut tested = 0;
        while tested < 50 {
            let rows = (0..20)
                .map(|_| rng.random::<u64>() & low_mask(20))
                .collect::<Vec<_>>();
            let mtx = AddressMatrix::new(&rows).unwrap();
            let Ok(inv) = mtx.inverse() else {
                assert!(rank(&rows) < 20);
                continue;
            };
            tested += 1;
            assert!(inv.multiply(&mtx).is_identity());
            for _ in 0..100 {
                let v = rng.random::<u64>() & low_mask(20);
                assert_eq!(inv.apply(mtx.apply(v)), v);
            }
        }
    }

    #[test]
    fn test_inverse_is_deterministic() {
        let config = crate::memory::MemConfiguration::from_functions(
            &crate::memory::desktop_functions(),
        )
        .unwrap();
        let mtx = config.dram_mtx;
        let a = mtx.inverse().unwrap();
        let b = mtx.inverse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a, config.addr_mtx);
        assert!(a.multiply(&mtx).is_identity());
        assert!(mtx.multiply(&b).is_identity());
    }

    #[test]
    fn test_independent_functions() {
        let fns = [0x4080, 0x88000, 0x4080 ^ 0x88000, 0, 0x110000, 0x88000];
        assert_eq!(independent_functions(&fns), vec![0x4080, 0x88000, 0x110000]);
        assert_eq!(rank(&fns), 3);
    }

    #[test]
    fn test_independent_functions_keeps_order() {
        let fns = [0b0110, 0b0011, 0b0101, 0b1000];
        assert_eq!(independent_functions(&fns), vec![0b0110, 0b0011, 0b1000]);
    }

    #[test]
    fn test_serde_width() {
        let mtx = AddressMatrix::new(&[0b10, 0b01]).unwrap();
        let json = serde_json::to_string(&mtx).unwrap();
        assert_eq!(json, "[2,1]");
        let back: AddressMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mtx);
        assert!(serde_json::from_str::<AddressMatrix>("[4,1]").is_err());
    }
}

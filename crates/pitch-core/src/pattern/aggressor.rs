use crate::pattern::ConstraintViolation;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Relative row offsets of the aggressors, in replay order.
///
/// Offsets are relative to the base row an instance is bound to and may be negative.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "Vec<isize>", into = "Vec<isize>")]
pub struct AggressorTuple(Vec<isize>);

impl AggressorTuple {
    /// Creates a tuple from row offsets.
    ///
    /// # Errors
    ///
    /// Fails with [`ConstraintViolation::EmptyTuple`] if `offsets` is empty.
    pub fn new(offsets: Vec<isize>) -> Result<Self, ConstraintViolation> {
        if offsets.is_empty() {
            return Err(ConstraintViolation::EmptyTuple);
        }
        Ok(AggressorTuple(offsets))
    }

    /// Number of aggressors in the tuple.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The row offsets.
    pub fn offsets(&self) -> &[isize] {
        &self.0
    }

    /// Smallest and largest offset.
    pub fn span(&self) -> (isize, isize) {
        let min = self.0.iter().copied().min().unwrap_or(0);
        let max = self.0.iter().copied().max().unwrap_or(0);
        (min, max)
    }
}

impl TryFrom<Vec<isize>> for AggressorTuple {
    type Error = ConstraintViolation;

    fn try_from(offsets: Vec<isize>) -> Result<Self, Self::Error> {
        AggressorTuple::new(offsets)
    }
}

impl From<AggressorTuple> for Vec<isize> {
    fn from(tuple: AggressorTuple) -> Self {
        tuple.0
    }
}

impl Display for AggressorTuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

//! Hammering pattern synthesis.
//!
//! Patterns are derived in one direction only:
//!
//! 1. [`PatternShape`]: an [`AggressorTuple`] of relative row offsets, repeated
//!    `amplitude` times inside a period set by the `frequency`.
//! 2. [`PhasedPatternShape`]: a shape with a fixed `phase` inside its period
//!    ([`bind_phase`]).
//! 3. [`PatternInstance`]: a phased shape bound to a base DRAM address
//!    ([`bind_address`]), which materializes into a [`Signal`] of aggressor and filler
//!    rows and is hammered through a [`HammerDriver`](crate::hammerer::HammerDriver).
//!
//! Every stage checks its invariants on construction and fails with a
//! [`ConstraintViolation`] instead of adjusting parameters.
mod aggressor;
mod generator;
mod instance;
mod phased;
mod shape;

pub use self::aggressor::AggressorTuple;
pub use self::generator::ShapeGenerator;
pub use self::instance::{
    HammerOutcome, PatternInstance, Signal, SignalEntry, SignalError, bind_address,
};
pub use self::phased::{PhasedPatternShape, bind_phase};
pub use self::shape::{Frequency, PatternShape};

use thiserror::Error;

/// A pattern parameter that breaks a shape, phase or instance invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ConstraintViolation {
    #[error("aggressor tuple is empty")]
    EmptyTuple,
    #[error("amplitude must be at least 1")]
    ZeroAmplitude,
    #[error("frequency must be positive")]
    ZeroFrequency,
    #[error("period ({period}) < pattern length ({pattern_len})")]
    PeriodTooShort { period: usize, pattern_len: usize },
    #[error("period can't be one with a single aggressor access")]
    UnitPeriod,
    #[error("phase {phase} exceeds the maximal phase {max_phase}")]
    PhaseOutOfRange { phase: usize, max_phase: usize },
    #[error("row offset {offset} from base row {base_row} leaves the row range [0, {max_rows})")]
    RowOutOfRange {
        base_row: usize,
        offset: isize,
        max_rows: usize,
    },
    #[error("activation budget of {budget} per period is smaller than the tuple length {tuple_len}")]
    ActivationBudgetTooSmall { budget: usize, tuple_len: usize },
}

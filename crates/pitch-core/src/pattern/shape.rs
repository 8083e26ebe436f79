use crate::pattern::{AggressorTuple, ConstraintViolation};
use crate::util::UidHasher;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Replay frequency of a pattern, stored exactly in tenths.
///
/// The period of a shape is `ceil(max_period / frequency)`; keeping the frequency as
/// an integer number of tenths makes that computation and shape equality exact.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Frequency(u32);

impl Frequency {
    /// Frequency of `tenths / 10`.
    pub fn from_tenths(tenths: u32) -> Self {
        Frequency(tenths)
    }

    /// Rounds `value` to the nearest tenth. Negative and NaN values become zero.
    pub fn from_f64(value: f64) -> Self {
        Frequency((value * 10.0).round() as u32)
    }

    /// `num / den` rounded to the nearest tenth (halves round up).
    ///
    /// A zero denominator yields a zero frequency.
    pub fn from_ratio(num: usize, den: usize) -> Self {
        if den == 0 {
            return Frequency(0);
        }
        let tenths = (20 * num + den) / (2 * den);
        Frequency(u32::try_from(tenths).unwrap_or(u32::MAX))
    }

    /// The frequency in tenths.
    pub fn tenths(&self) -> u32 {
        self.0
    }

    /// The frequency as a floating point value.
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 10.0
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

/// Abstract hammering pattern: which aggressors, how often, at which rate.
///
/// The pattern is the aggressor tuple repeated `amplitude` times. It is replayed once
/// per period, where `period = ceil(max_period / frequency)` and
/// `max_period = num_refs * act_per_ref`.
///
/// Two shapes with the same parameters are equal and share the same [`uid`](Self::uid).
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternShape {
    max_period: usize,
    act_per_ref: usize,
    aggr_tuple: AggressorTuple,
    amplitude: usize,
    frequency: Frequency,
}

impl PatternShape {
    /// Creates a shape and checks that its pattern fits the period.
    ///
    /// # Arguments
    ///
    /// * `num_refs` - REF intervals the period ceiling spans
    /// * `act_per_ref` - Activations per REF interval
    /// * `aggr_tuple` - Relative aggressor rows
    /// * `amplitude` - Repetitions of the tuple per period
    /// * `frequency` - Replays of the pattern per maximal period
    ///
    /// # Errors
    ///
    /// Fails if the amplitude or frequency is zero, if the period is shorter than the
    /// pattern, or if a single access would get a period of one.
    pub fn new(
        num_refs: usize,
        act_per_ref: usize,
        aggr_tuple: AggressorTuple,
        amplitude: usize,
        frequency: Frequency,
    ) -> Result<Self, ConstraintViolation> {
        if amplitude == 0 {
            return Err(ConstraintViolation::ZeroAmplitude);
        }
        if frequency.tenths() == 0 {
            return Err(ConstraintViolation::ZeroFrequency);
        }
        let shape = PatternShape {
            max_period: num_refs * act_per_ref,
            act_per_ref,
            aggr_tuple,
            amplitude,
            frequency,
        };
        let (period, pattern_len) = (shape.period(), shape.pattern_len());
        if period < pattern_len {
            return Err(ConstraintViolation::PeriodTooShort {
                period,
                pattern_len,
            });
        }
        if pattern_len == 1 && period == 1 {
            return Err(ConstraintViolation::UnitPeriod);
        }
        Ok(shape)
    }

    /// Length of the longest possible period in activation slots.
    pub fn max_period(&self) -> usize {
        self.max_period
    }

    /// Activations per REF interval.
    pub fn act_per_ref(&self) -> usize {
        self.act_per_ref
    }

    /// The relative aggressor rows.
    pub fn aggr_tuple(&self) -> &AggressorTuple {
        &self.aggr_tuple
    }

    /// Repetitions of the tuple per period.
    pub fn amplitude(&self) -> usize {
        self.amplitude
    }

    /// Replay frequency.
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Number of activation slots between two replays of the pattern.
    pub fn period(&self) -> usize {
        (self.max_period * 10).div_ceil(self.frequency.tenths() as usize)
    }

    /// Number of accesses in one replay (`amplitude * |tuple|`).
    pub fn pattern_len(&self) -> usize {
        self.amplitude * self.aggr_tuple.len()
    }

    /// The tuple repeated `amplitude` times.
    pub fn pattern(&self) -> Vec<isize> {
        std::iter::repeat_n(self.aggr_tuple.offsets(), self.amplitude)
            .flatten()
            .copied()
            .collect()
    }

    /// Largest phase that still fits the pattern into the period.
    pub fn max_phase(&self) -> usize {
        self.period() - self.pattern_len()
    }

    /// 32-bit identifier derived from all shape parameters.
    pub fn uid(&self) -> u32 {
        self.uid_hasher().finish()
    }

    pub(crate) fn uid_hasher(&self) -> UidHasher {
        let offsets = self.aggr_tuple.offsets();
        let hasher = UidHasher::default()
            .word(self.max_period as u64)
            .word(self.act_per_ref as u64)
            .word(self.amplitude as u64)
            .word(u64::from(self.frequency.tenths()))
            .word(offsets.len() as u64);
        offsets
            .iter()
            .fold(hasher, |hasher, &offset| hasher.signed(offset as i64))
    }
}

impl Display for PatternShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{uid: {:08x}, freq: {}, ampl: {}, aggr: {}, period: {}}}",
            self.uid(),
            self.frequency,
            self.amplitude,
            self.aggr_tuple,
            self.period()
        )
    }
}

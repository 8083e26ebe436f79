use crate::pattern::{ConstraintViolation, PatternShape};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// A [`PatternShape`] placed at a fixed offset (`phase`) inside its period.
///
/// Invariant: `phase + pattern_len <= period`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhasedPatternShape {
    #[serde(flatten)]
    shape: PatternShape,
    phase: usize,
}

/// Binds `shape` to `phase`.
///
/// # Errors
///
/// Fails with [`ConstraintViolation::PhaseOutOfRange`] if the pattern would not fit
/// into the period when started at `phase`. The phase is never clamped.
pub fn bind_phase(
    shape: &PatternShape,
    phase: usize,
) -> Result<PhasedPatternShape, ConstraintViolation> {
    let max_phase = shape.max_phase();
    if phase > max_phase {
        return Err(ConstraintViolation::PhaseOutOfRange { phase, max_phase });
    }
    Ok(PhasedPatternShape {
        shape: shape.clone(),
        phase,
    })
}

impl PhasedPatternShape {
    /// The underlying shape.
    pub fn shape(&self) -> &PatternShape {
        &self.shape
    }

    /// Offset of the first pattern access inside the period.
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Pattern index for every slot of one period.
    ///
    /// The pattern occupies slots `phase..phase + pattern_len` (wrapping around the
    /// end of the period), all other slots are `None`.
    pub fn slot_indices(&self) -> Vec<Option<usize>> {
        let period = self.shape.period();
        let mut slots = vec![None; period];
        for i in 0..self.shape.pattern_len() {
            slots[(i + self.phase) % period] = Some(i);
        }
        slots
    }

    /// Relative aggressor offset for every slot of one period.
    pub fn to_signal(&self) -> Vec<Option<isize>> {
        let pattern = self.shape.pattern();
        self.slot_indices()
            .into_iter()
            .map(|slot| slot.map(|i| pattern[i]))
            .collect()
    }

    /// 32-bit identifier derived from the shape parameters and the phase.
    pub fn uid(&self) -> u32 {
        self.shape.uid_hasher().word(self.phase as u64).finish()
    }
}

impl Display for PhasedPatternShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{uid: {:08x}, freq: {}, ampl: {}, aggr: {}, period: {}, phase: {}}}",
            self.uid(),
            self.shape.frequency(),
            self.shape.amplitude(),
            self.shape.aggr_tuple(),
            self.shape.period(),
            self.phase
        )
    }
}

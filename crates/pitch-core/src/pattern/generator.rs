use crate::config::PatternParams;
use crate::pattern::{AggressorTuple, ConstraintViolation, Frequency, PatternShape};
use crate::util::Rng;
use log::{debug, warn};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

/// Generates [`PatternShape`]s for one aggressor tuple within the refresh budget.
///
/// The amplitude is drawn from `[1, expected_iterations]` with weights decaying
/// linearly, `w(x) = 1 - x / (1.5 * b - a)` for the range `[a, b]`, so small
/// amplitudes are preferred. The frequency is then `expected_iterations / amplitude`
/// rounded to a tenth, which keeps `amplitude * frequency` close to the activation
/// budget of the maximal period whatever amplitude was drawn.
#[derive(Debug, Clone)]
pub struct ShapeGenerator {
    params: PatternParams,
    aggr_tuple: AggressorTuple,
    amplitudes: Option<WeightedIndex<f64>>,
}

impl ShapeGenerator {
    /// Creates a generator.
    ///
    /// # Errors
    ///
    /// Fails if the activation budget per maximal period is smaller than the tuple.
    pub fn new(
        params: PatternParams,
        aggr_tuple: AggressorTuple,
    ) -> Result<Self, ConstraintViolation> {
        let budget = params.expected_act_per_max_period();
        let expected = budget / aggr_tuple.len();
        if expected == 0 {
            return Err(ConstraintViolation::ActivationBudgetTooSmall {
                budget,
                tuple_len: aggr_tuple.len(),
            });
        }
        let amplitudes = WeightedIndex::new(amplitude_weights(1, expected))
            .inspect_err(|e| {
                warn!(
                    "No usable amplitude weights for range [1, {}] ({}), using amplitude 1",
                    expected, e
                )
            })
            .ok();
        debug!(
            "Shape generator for {}: {} iterations per maximal period",
            aggr_tuple, expected
        );
        Ok(ShapeGenerator {
            params,
            aggr_tuple,
            amplitudes,
        })
    }

    /// Tuple repetitions that exhaust the activation budget of one maximal period.
    pub fn expected_iterations(&self) -> usize {
        self.params.expected_act_per_max_period() / self.aggr_tuple.len()
    }

    /// Draws an amplitude and derives the matching frequency.
    pub fn amplitude_frequency(&self, rng: &mut Rng) -> (usize, Frequency) {
        let amplitude = self
            .amplitudes
            .as_ref()
            .map(|dist| dist.sample(rng) + 1)
            .unwrap_or(1);
        let frequency = Frequency::from_ratio(self.expected_iterations(), amplitude);
        (amplitude, frequency)
    }

    /// Generates one validated shape.
    ///
    /// # Errors
    ///
    /// Returns the violated invariant if the drawn parameters do not form a valid
    /// shape.
    pub fn generate(&self, rng: &mut Rng) -> Result<PatternShape, ConstraintViolation> {
        let (amplitude, frequency) = self.amplitude_frequency(rng);
        PatternShape::new(
            self.params.max_refs,
            self.params.max_act_per_ref,
            self.aggr_tuple.clone(),
            amplitude,
            frequency,
        )
    }

    /// Generates `count` shapes, skipping (and logging) invalid draws.
    pub fn generate_many(&self, count: usize, rng: &mut Rng) -> Vec<PatternShape> {
        (0..count)
            .filter_map(|_| {
                self.generate(rng)
                    .inspect_err(|e| warn!("Skipping shape: {}", e))
                    .ok()
            })
            .collect()
    }
}

/// Linear decay weights `1 - x / (1.5 * b - a)` for every `x` in `[a, b]`.
///
/// Negative weights are clamped to zero.
fn amplitude_weights(a: usize, b: usize) -> Vec<f64> {
    let denom = 1.5 * b as f64 - a as f64;
    (a..=b)
        .map(|x| (1.0 - x as f64 / denom).max(0.0))
        .collect()
}

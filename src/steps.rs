use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::calculators::{round_and_clamp, GoalFormula};
use crate::input::{AgeBand, CalculationInput};
use crate::models::GoalBounds;

/// Daily step goal from age-banded activity guidance
///
/// Starts from the 10,000 step baseline and scales it by age band:
/// - Youth (13-17): 120% (higher daily activity guidance)
/// - Adult (18-64): baseline
/// - Older adult (65+): 80%
///
/// The result is clamped to 5,000-20,000 steps.
pub struct StepsGoalCalculator;

impl StepsGoalCalculator {
    pub const BASELINE_STEPS: u32 = 10_000;

    /// Multiplier applied to the baseline for an age band
    pub fn age_multiplier(band: AgeBand) -> Decimal {
        match band {
            AgeBand::Youth => dec!(1.2),
            AgeBand::Adult => dec!(1.0),
            AgeBand::OlderAdult => dec!(0.8),
        }
    }
}

impl GoalFormula for StepsGoalCalculator {
    fn name(&self) -> &'static str {
        "steps"
    }

    fn calculate(&self, input: &CalculationInput) -> u32 {
        let steps = Decimal::from(Self::BASELINE_STEPS) * Self::age_multiplier(input.age_band());
        round_and_clamp(steps, GoalBounds::STEPS_MIN, GoalBounds::STEPS_MAX)
    }
}

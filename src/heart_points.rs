use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::calculators::{round_and_clamp, GoalFormula};
use crate::input::{AgeBand, CalculationInput};
use crate::models::GoalBounds;

/// Daily heart points goal
///
/// One heart point per minute of moderate activity. The adult baseline is the
/// 150 minutes/week guideline spread over 7 days (~21/day), scaled by age band
/// and clamped to 15-50 points.
pub struct HeartPointsGoalCalculator;

impl HeartPointsGoalCalculator {
    pub const WEEKLY_MODERATE_MINUTES: u32 = 150;

    /// Adult daily baseline before rounding
    pub fn daily_baseline() -> Decimal {
        Decimal::from(Self::WEEKLY_MODERATE_MINUTES) / dec!(7)
    }

    /// Multiplier applied to the baseline for an age band
    pub fn age_multiplier(band: AgeBand) -> Decimal {
        match band {
            AgeBand::Youth => dec!(1.5),
            AgeBand::Adult => dec!(1.0),
            AgeBand::OlderAdult => dec!(0.85),
        }
    }
}

impl GoalFormula for HeartPointsGoalCalculator {
    fn name(&self) -> &'static str {
        "heart_points"
    }

    fn calculate(&self, input: &CalculationInput) -> u32 {
        let points = Self::daily_baseline() * Self::age_multiplier(input.age_band());
        round_and_clamp(points, GoalBounds::HEART_POINTS_MIN, GoalBounds::HEART_POINTS_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityLevel, Gender};

    fn input_for_age(age: u32) -> CalculationInput {
        CalculationInput::new(age, Gender::Female, dec!(165), dec!(60), ActivityLevel::Moderate).unwrap()
    }

    #[test]
    fn test_adult_baseline() {
        assert_eq!(HeartPointsGoalCalculator.calculate(&input_for_age(30)), 21);
    }

    #[test]
    fn test_youth_and_older_bands() {
        assert_eq!(HeartPointsGoalCalculator.calculate(&input_for_age(15)), 32);
        assert_eq!(HeartPointsGoalCalculator.calculate(&input_for_age(80)), 18);
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(HeartPointsGoalCalculator.calculate(&input_for_age(17)), 32);
        assert_eq!(HeartPointsGoalCalculator.calculate(&input_for_age(18)), 21);
        assert_eq!(HeartPointsGoalCalculator.calculate(&input_for_age(64)), 21);
        assert_eq!(HeartPointsGoalCalculator.calculate(&input_for_age(65)), 18);
    }

    #[test]
    fn test_within_bounds_for_all_ages() {
        for age in 13..=120 {
            let points = HeartPointsGoalCalculator.calculate(&input_for_age(age));
            assert!((15..=50).contains(&points), "age {} gave {}", age, points);
        }
    }
}

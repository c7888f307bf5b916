use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::calculators::{round_and_clamp, GoalFormula};
use crate::input::CalculationInput;
use crate::models::{Gender, GoalBounds};

/// Daily calorie expenditure goal
///
/// BMR by gender:
/// - Male (revised Harris-Benedict): 88.362 + 13.397·kg + 4.799·cm − 5.677·age
/// - Female (revised Harris-Benedict): 447.593 + 9.247·kg + 3.098·cm − 4.330·age
/// - Other / prefer not to say (Mifflin-St Jeor, sex-neutral constant): 10·kg + 6.25·cm − 5·age + 5
///
/// Goal = BMR × activity factor, rounded and clamped to 1,200-4,000 kcal.
pub struct CaloriesGoalCalculator;

impl CaloriesGoalCalculator {
    /// Basal metabolic rate in kcal/day
    ///
    /// Returns None only when the arithmetic overflows, which requires body
    /// metrics far beyond anything physical.
    pub fn bmr(input: &CalculationInput) -> Option<Decimal> {
        let (constant, weight_coef, height_coef, age_coef) = match input.gender() {
            Gender::Male => (dec!(88.362), dec!(13.397), dec!(4.799), dec!(5.677)),
            Gender::Female => (dec!(447.593), dec!(9.247), dec!(3.098), dec!(4.330)),
            Gender::Other | Gender::PreferNotToSay => (dec!(5), dec!(10), dec!(6.25), dec!(5)),
        };

        let weight_term = weight_coef.checked_mul(input.weight_kg())?;
        let height_term = height_coef.checked_mul(input.height_cm())?;
        let age_term = age_coef * Decimal::from(input.age());

        constant
            .checked_add(weight_term)?
            .checked_add(height_term)?
            .checked_sub(age_term)
    }

    /// BMR scaled by the activity factor, before rounding and clamping
    pub fn total_energy_expenditure(input: &CalculationInput) -> Option<Decimal> {
        Self::bmr(input)?.checked_mul(input.activity_level().factor())
    }
}

impl GoalFormula for CaloriesGoalCalculator {
    fn name(&self) -> &'static str {
        "calories"
    }

    fn calculate(&self, input: &CalculationInput) -> u32 {
        match Self::total_energy_expenditure(input) {
            Some(tdee) => round_and_clamp(tdee, GoalBounds::CALORIES_MIN, GoalBounds::CALORIES_MAX),
            // Overflow only happens on the high side
            None => GoalBounds::CALORIES_MAX,
        }
    }
}

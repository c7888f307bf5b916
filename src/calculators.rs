//! The seam between the orchestrator and the goal formulas
//!
//! Each formula is a pure function of a [`CalculationInput`]. The orchestrator
//! only sees them through [`GoalFormula`], so any of the three can be replaced
//! (or instrumented) without touching the orchestration logic.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::sync::Arc;

use crate::calories::CaloriesGoalCalculator;
use crate::heart_points::HeartPointsGoalCalculator;
use crate::input::CalculationInput;
use crate::steps::StepsGoalCalculator;

/// A pure, total goal formula
pub trait GoalFormula: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Calculate the goal for a validated input
    fn calculate(&self, input: &CalculationInput) -> u32;
}

/// The three formulas the orchestrator runs
#[derive(Clone)]
pub struct GoalCalculators {
    pub steps: Arc<dyn GoalFormula>,
    pub calories: Arc<dyn GoalFormula>,
    pub heart_points: Arc<dyn GoalFormula>,
}

impl GoalCalculators {
    /// Guideline formulas
    pub fn standard() -> Self {
        Self {
            steps: Arc::new(StepsGoalCalculator),
            calories: Arc::new(CaloriesGoalCalculator),
            heart_points: Arc::new(HeartPointsGoalCalculator),
        }
    }

    pub fn with_steps(mut self, formula: Arc<dyn GoalFormula>) -> Self {
        self.steps = formula;
        self
    }

    pub fn with_calories(mut self, formula: Arc<dyn GoalFormula>) -> Self {
        self.calories = formula;
        self
    }

    pub fn with_heart_points(mut self, formula: Arc<dyn GoalFormula>) -> Self {
        self.heart_points = formula;
        self
    }
}

impl Default for GoalCalculators {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for GoalCalculators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalCalculators")
            .field("steps", &self.steps.name())
            .field("calories", &self.calories.name())
            .field("heart_points", &self.heart_points.name())
            .finish()
    }
}

/// Round half away from zero, then clamp into `[min, max]`
pub(crate) fn round_and_clamp(value: Decimal, min: u32, max: u32) -> u32 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .clamp(Decimal::from(min), Decimal::from(max))
        .to_u32()
        .unwrap_or(min)
}

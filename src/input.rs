//! Validated calculator input
//!
//! A [`CalculationInput`] can only be built through range checks, so the
//! calculators never see an out-of-range value and stay total.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FieldViolation, GoalsError};
use crate::models::{ActivityLevel, Gender, UserProfile};

pub const MIN_AGE: u32 = 13;
pub const MAX_AGE: u32 = 120;

/// Guideline age band shared by the steps and heart points formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgeBand {
    /// 13-17
    Youth,
    /// 18-64
    Adult,
    /// 65 and over
    OlderAdult,
}

impl AgeBand {
    /// Boundary ages belong to the band that starts at them (18 is adult, 65 is older adult)
    pub fn from_age(age: u32) -> Self {
        match age {
            0..=17 => AgeBand::Youth,
            18..=64 => AgeBand::Adult,
            _ => AgeBand::OlderAdult,
        }
    }
}

/// Immutable, range-checked input shared by the three calculators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationInput {
    age: u32,
    gender: Gender,
    height_cm: Decimal,
    weight_kg: Decimal,
    activity_level: ActivityLevel,
}

impl CalculationInput {
    /// Build an input from raw values, rejecting anything out of range
    pub fn new(
        age: u32,
        gender: Gender,
        height_cm: Decimal,
        weight_kg: Decimal,
        activity_level: ActivityLevel,
    ) -> Result<Self, GoalsError> {
        let mut violations = Vec::new();
        check_age(age, &mut violations);
        check_positive("height_cm", height_cm, &mut violations);
        check_positive("weight_kg", weight_kg, &mut violations);

        if !violations.is_empty() {
            return Err(GoalsError::ValidationFailed { violations });
        }

        Ok(Self {
            age,
            gender,
            height_cm,
            weight_kg,
            activity_level,
        })
    }

    /// Build an input from a stored profile, deriving age as of `today`
    ///
    /// Every missing or out-of-range field is reported, not just the first.
    pub fn from_profile(profile: &UserProfile, today: NaiveDate) -> Result<Self, GoalsError> {
        let mut violations = Vec::new();

        let age = match profile.birthdate {
            Some(birthdate) => match age_on(birthdate, today) {
                Some(age) => {
                    check_age(age, &mut violations);
                    Some(age)
                }
                None => {
                    violations.push(FieldViolation::new(
                        "birthdate",
                        format!("{} is in the future", birthdate),
                    ));
                    None
                }
            },
            None => {
                violations.push(FieldViolation::required("birthdate"));
                None
            }
        };

        if profile.gender.is_none() {
            violations.push(FieldViolation::required("gender"));
        }
        match profile.height_cm {
            Some(height) => check_positive("height_cm", height, &mut violations),
            None => violations.push(FieldViolation::required("height_cm")),
        }
        match profile.weight_kg {
            Some(weight) => check_positive("weight_kg", weight, &mut violations),
            None => violations.push(FieldViolation::required("weight_kg")),
        }
        if profile.activity_level.is_none() {
            violations.push(FieldViolation::required("activity_level"));
        }

        match (
            age,
            profile.gender,
            profile.height_cm,
            profile.weight_kg,
            profile.activity_level,
        ) {
            (Some(age), Some(gender), Some(height_cm), Some(weight_kg), Some(activity_level))
                if violations.is_empty() =>
            {
                Ok(Self {
                    age,
                    gender,
                    height_cm,
                    weight_kg,
                    activity_level,
                })
            }
            _ => Err(GoalsError::ValidationFailed { violations }),
        }
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn age_band(&self) -> AgeBand {
        AgeBand::from_age(self.age)
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn height_cm(&self) -> Decimal {
        self.height_cm
    }

    pub fn weight_kg(&self) -> Decimal {
        self.weight_kg
    }

    pub fn activity_level(&self) -> ActivityLevel {
        self.activity_level
    }
}

/// Whole years between `birthdate` and `today`, None if born after `today`
pub fn age_on(birthdate: NaiveDate, today: NaiveDate) -> Option<u32> {
    today.years_since(birthdate)
}

fn check_age(age: u32, violations: &mut Vec<FieldViolation>) {
    if !(MIN_AGE..=MAX_AGE).contains(&age) {
        violations.push(FieldViolation::new(
            "age",
            format!("{} is outside [{}, {}]", age, MIN_AGE, MAX_AGE),
        ));
    }
}

fn check_positive(field: &str, value: Decimal, violations: &mut Vec<FieldViolation>) {
    if value <= Decimal::ZERO {
        violations.push(FieldViolation::new(field, format!("{} must be > 0", value)));
    }
}

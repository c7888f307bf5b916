use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::fingerprint::ProfileFingerprint;
use crate::input::AgeBand;

/// Gender as recorded on the user profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "MALE"),
            Gender::Female => write!(f, "FEMALE"),
            Gender::Other => write!(f, "OTHER"),
            Gender::PreferNotToSay => write!(f, "PREFER_NOT_TO_SAY"),
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            "prefer_not_to_say" | "unspecified" => Ok(Gender::PreferNotToSay),
            _ => Err(format!("Invalid gender: {}", s)),
        }
    }
}

/// Habitual activity level, each carrying its TDEE multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    /// Multiplier applied to BMR to estimate total daily energy expenditure
    pub fn factor(&self) -> Decimal {
        match self {
            ActivityLevel::Sedentary => dec!(1.2),
            ActivityLevel::Light => dec!(1.375),
            ActivityLevel::Moderate => dec!(1.55),
            ActivityLevel::Active => dec!(1.725),
            ActivityLevel::VeryActive => dec!(1.9),
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityLevel::Sedentary => write!(f, "SEDENTARY"),
            ActivityLevel::Light => write!(f, "LIGHT"),
            ActivityLevel::Moderate => write!(f, "MODERATE"),
            ActivityLevel::Active => write!(f, "ACTIVE"),
            ActivityLevel::VeryActive => write!(f, "VERY_ACTIVE"),
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "sedentary" => Ok(ActivityLevel::Sedentary),
            "light" => Ok(ActivityLevel::Light),
            "moderate" => Ok(ActivityLevel::Moderate),
            "active" => Ok(ActivityLevel::Active),
            "very_active" => Ok(ActivityLevel::VeryActive),
            _ => Err(format!("Invalid activity level: {}", s)),
        }
    }
}

/// Where a set of daily goals came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationSource {
    /// Guideline formulas applied to the profile
    WhoStandard,
    /// Personalized by an external adapter
    Personalized,
    /// Formula result adjusted by the user
    UserAdjusted,
    /// Entered by the user, formulas skipped
    Manual,
    /// Static guideline values
    Default,
    /// Guideline values served because nothing else was available
    FallbackDefault,
}

impl CalculationSource {
    /// True for sources that bypass the formulas
    pub fn is_override(&self) -> bool {
        matches!(self, CalculationSource::Manual | CalculationSource::UserAdjusted)
    }
}

impl fmt::Display for CalculationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalculationSource::WhoStandard => write!(f, "WHO_STANDARD"),
            CalculationSource::Personalized => write!(f, "PERSONALIZED"),
            CalculationSource::UserAdjusted => write!(f, "USER_ADJUSTED"),
            CalculationSource::Manual => write!(f, "MANUAL"),
            CalculationSource::Default => write!(f, "DEFAULT"),
            CalculationSource::FallbackDefault => write!(f, "FALLBACK_DEFAULT"),
        }
    }
}

/// Safety bands every goal is clamped into
pub struct GoalBounds;

impl GoalBounds {
    pub const STEPS_MIN: u32 = 5_000;
    pub const STEPS_MAX: u32 = 20_000;
    pub const CALORIES_MIN: u32 = 1_200;
    pub const CALORIES_MAX: u32 = 4_000;
    pub const HEART_POINTS_MIN: u32 = 15;
    pub const HEART_POINTS_MAX: u32 = 50;

    pub fn clamp_steps(value: u32) -> u32 {
        value.clamp(Self::STEPS_MIN, Self::STEPS_MAX)
    }

    pub fn clamp_calories(value: u32) -> u32 {
        value.clamp(Self::CALORIES_MIN, Self::CALORIES_MAX)
    }

    pub fn clamp_heart_points(value: u32) -> u32 {
        value.clamp(Self::HEART_POINTS_MIN, Self::HEART_POINTS_MAX)
    }

    /// Check all three goals against their bands
    pub fn contains(steps: u32, calories: u32, heart_points: u32) -> bool {
        (Self::STEPS_MIN..=Self::STEPS_MAX).contains(&steps)
            && (Self::CALORIES_MIN..=Self::CALORIES_MAX).contains(&calories)
            && (Self::HEART_POINTS_MIN..=Self::HEART_POINTS_MAX).contains(&heart_points)
    }
}

/// Kind of user-supplied goal override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideKind {
    /// Goals typed in by the user
    Manual,
    /// Goals the user tuned from a previous recommendation
    UserAdjusted,
}

impl OverrideKind {
    pub fn source(&self) -> CalculationSource {
        match self {
            OverrideKind::Manual => CalculationSource::Manual,
            OverrideKind::UserAdjusted => CalculationSource::UserAdjusted,
        }
    }
}

/// User-supplied goal values that replace the formulas
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalOverrides {
    pub kind: OverrideKind,
    pub steps: u32,
    pub calories: u32,
    pub heart_points: u32,
}

/// Profile as handed over by the profile source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Unique user identifier
    pub user_id: String,

    /// Display name, not used in calculations
    pub display_name: Option<String>,

    /// Date of birth; age is derived from it at calculation time
    pub birthdate: Option<NaiveDate>,

    pub gender: Option<Gender>,

    /// Height in centimeters
    pub height_cm: Option<Decimal>,

    /// Weight in kilograms
    pub weight_kg: Option<Decimal>,

    pub activity_level: Option<ActivityLevel>,

    /// Manual or user-adjusted goals that bypass the formulas
    pub goal_overrides: Option<GoalOverrides>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Create an empty profile for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            birthdate: None,
            gender: None,
            height_cm: None,
            weight_kg: None,
            activity_level: None,
            goal_overrides: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_birthdate(mut self, birthdate: NaiveDate) -> Self {
        self.birthdate = Some(birthdate);
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_height_cm(mut self, height_cm: Decimal) -> Self {
        self.height_cm = Some(height_cm);
        self
    }

    pub fn with_weight_kg(mut self, weight_kg: Decimal) -> Self {
        self.weight_kg = Some(weight_kg);
        self
    }

    pub fn with_activity_level(mut self, activity_level: ActivityLevel) -> Self {
        self.activity_level = Some(activity_level);
        self
    }

    pub fn with_overrides(mut self, overrides: GoalOverrides) -> Self {
        self.goal_overrides = Some(overrides);
        self
    }
}

/// Computed daily wellness targets for a user
///
/// Instances are immutable once built; a recalculation produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyGoals {
    /// Unique identifier of this calculation
    pub id: String,

    pub user_id: String,

    pub steps_goal: u32,

    pub calories_goal: u32,

    pub heart_points_goal: u32,

    pub calculated_at: DateTime<Utc>,

    pub calculation_source: CalculationSource,

    /// Fingerprint of the profile the goals were calculated from
    pub profile_fingerprint: ProfileFingerprint,

    /// All three goals lie within their safety bands
    pub is_valid: bool,

    /// Profile fingerprint unchanged since calculation
    pub is_fresh: bool,
}

impl DailyGoals {
    pub const DEFAULT_STEPS: u32 = 10_000;
    pub const DEFAULT_CALORIES: u32 = 2_000;
    pub const DEFAULT_HEART_POINTS: u32 = 21;

    pub(crate) fn new(
        user_id: impl Into<String>,
        steps_goal: u32,
        calories_goal: u32,
        heart_points_goal: u32,
        calculation_source: CalculationSource,
        profile_fingerprint: ProfileFingerprint,
        calculated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            steps_goal,
            calories_goal,
            heart_points_goal,
            calculated_at,
            calculation_source,
            profile_fingerprint,
            is_valid: GoalBounds::contains(steps_goal, calories_goal, heart_points_goal),
            is_fresh: true,
        }
    }

    /// Guideline goals used when no personalized result is available
    pub fn defaults(
        user_id: impl Into<String>,
        source: CalculationSource,
        calculated_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            user_id,
            Self::DEFAULT_STEPS,
            Self::DEFAULT_CALORIES,
            Self::DEFAULT_HEART_POINTS,
            source,
            ProfileFingerprint::empty(),
            calculated_at,
        )
    }

    /// Re-check the safety bands rather than trusting the stored flag
    pub fn within_bounds(&self) -> bool {
        GoalBounds::contains(self.steps_goal, self.calories_goal, self.heart_points_goal)
    }

    /// Copy of these goals with the freshness flag set
    pub fn with_freshness(&self, is_fresh: bool) -> Self {
        Self {
            is_fresh,
            ..self.clone()
        }
    }
}

/// Explanation of the last calculation for a user, for display purposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalBreakdown {
    pub user_id: String,
    pub age: u32,
    pub age_band: AgeBand,
    pub gender: Gender,
    pub activity_level: ActivityLevel,
    pub activity_factor: Decimal,

    /// Basal metabolic rate, None when overrides bypassed the formulas
    pub bmr: Option<Decimal>,

    /// BMR times activity factor before rounding and clamping
    pub total_energy_expenditure: Option<Decimal>,

    pub steps_goal: u32,
    pub calories_goal: u32,
    pub heart_points_goal: u32,
    pub calculation_source: CalculationSource,
    pub profile_fingerprint: ProfileFingerprint,
}

//! Profile fingerprinting
//!
//! A fingerprint covers exactly the profile fields that change the computed
//! goals. Equal fingerprints imply equal goals. SHA256 keeps the value stable
//! across processes, so it can be persisted alongside the goals.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::input::age_on;
use crate::models::UserProfile;

/// Comparable digest of the calculation-relevant profile fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileFingerprint(String);

impl ProfileFingerprint {
    /// Fingerprint a profile as of `today`
    ///
    /// The derived age is included so that a birthday, which changes the age
    /// band and the BMR, also changes the fingerprint.
    pub fn of(profile: &UserProfile, today: NaiveDate) -> Self {
        let age = profile.birthdate.and_then(|dob| age_on(dob, today));
        let overrides = profile.goal_overrides.as_ref().map(|o| {
            format!("{:?}:{}:{}:{}", o.kind, o.steps, o.calories, o.heart_points)
        });

        let canonical = format!(
            "birthdate={}|age={}|gender={}|height_cm={}|weight_kg={}|activity={}|overrides={}",
            field(profile.birthdate),
            field(age),
            field(profile.gender),
            field(profile.height_cm.map(|h| h.normalize())),
            field(profile.weight_kg.map(|w| w.normalize())),
            field(profile.activity_level),
            field(overrides),
        );

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Placeholder fingerprint for goals not derived from a profile
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log output
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ProfileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn field<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityLevel, Gender, GoalOverrides, OverrideKind};
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn profile() -> UserProfile {
        UserProfile::new("user_1")
            .with_birthdate(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap())
            .with_gender(Gender::Male)
            .with_height_cm(dec!(180))
            .with_weight_kg(dec!(75))
            .with_activity_level(ActivityLevel::Sedentary)
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = ProfileFingerprint::of(&profile(), today());
        let b = ProfileFingerprint::of(&profile(), today());
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_fingerprint_ignores_non_calculation_fields() {
        let mut renamed = profile();
        renamed.display_name = Some("Someone".to_string());
        renamed.updated_at = chrono::Utc::now() + chrono::Duration::days(3);
        renamed.user_id = "other_id".to_string();
        assert_eq!(
            ProfileFingerprint::of(&profile(), today()),
            ProfileFingerprint::of(&renamed, today())
        );
    }

    #[test]
    fn test_fingerprint_ignores_decimal_scale() {
        let scaled = profile().with_height_cm(dec!(180.00));
        assert_eq!(
            ProfileFingerprint::of(&profile(), today()),
            ProfileFingerprint::of(&scaled, today())
        );
    }

    #[test]
    fn test_fingerprint_changes_with_calculation_fields() {
        let base = ProfileFingerprint::of(&profile(), today());

        let variants = vec![
            profile().with_weight_kg(dec!(76)),
            profile().with_height_cm(dec!(181)),
            profile().with_gender(Gender::Female),
            profile().with_activity_level(ActivityLevel::Active),
            profile().with_birthdate(NaiveDate::from_ymd_opt(1990, 1, 2).unwrap()),
            profile().with_overrides(GoalOverrides {
                kind: OverrideKind::Manual,
                steps: 8_000,
                calories: 1_800,
                heart_points: 20,
            }),
        ];

        for variant in variants {
            assert_ne!(base, ProfileFingerprint::of(&variant, today()));
        }
    }

    #[test]
    fn test_fingerprint_changes_on_birthday() {
        let before = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let after = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_ne!(
            ProfileFingerprint::of(&profile(), before),
            ProfileFingerprint::of(&profile(), after)
        );
        // Same age, different day: unchanged
        let later = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(
            ProfileFingerprint::of(&profile(), today()),
            ProfileFingerprint::of(&profile(), later)
        );
    }
}

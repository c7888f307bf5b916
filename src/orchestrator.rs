//! Goal calculation use case
//!
//! [`GoalCalculationOrchestrator`] is the single boundary between callers and
//! the formulas. For one user it runs:
//!
//! 1. load profile (missing → `ProfileNotFound`)
//! 2. build and validate [`CalculationInput`] (→ `ValidationFailed`, no formulas run)
//! 3. fingerprint the profile and consult the [`FreshnessCache`]
//! 4. run the three formulas, or apply the profile's overrides
//! 5. persist through [`GoalStorage`] (→ `StorageFailed` carrying the goals)
//! 6. update the cache
//!
//! The sequence is serialized per user; different users never wait on each other.

use rayon::prelude::*;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::FreshnessCache;
use crate::calculators::{GoalCalculators, GoalFormula};
use crate::calories::CaloriesGoalCalculator;
use crate::clock::{Clock, SystemClock};
use crate::error::{ErrorSeverity, GoalsError, Result};
use crate::fingerprint::ProfileFingerprint;
use crate::input::CalculationInput;
use crate::models::{
    CalculationSource, DailyGoals, GoalBounds, GoalBreakdown, GoalOverrides, UserProfile,
};
use crate::storage::{GoalStorage, ProfileSource};

/// Successful result of [`GoalCalculationOrchestrator::calculate_and_store`]
#[derive(Debug, Clone, PartialEq)]
pub struct GoalCalculationOutcome {
    pub goals: DailyGoals,
    /// False when the goals came from the freshness cache
    pub was_recalculated: bool,
}

/// Per-user lifecycle as observed by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalState {
    NoGoals,
    Computing,
    Stored { fresh: bool },
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum SlotState {
    #[default]
    NoGoals,
    Stored,
    Failed,
}

/// Serialization point and bookkeeping for one user
#[derive(Debug, Default)]
struct UserSlot {
    state: SlotState,
    last_breakdown: Option<GoalBreakdown>,
}

/// Computes, caches and persists daily goals
pub struct GoalCalculationOrchestrator {
    profiles: Arc<dyn ProfileSource>,
    storage: Arc<dyn GoalStorage>,
    calculators: GoalCalculators,
    cache: FreshnessCache,
    clock: Arc<dyn Clock>,
    users: Mutex<HashMap<String, Arc<Mutex<UserSlot>>>>,
}

impl GoalCalculationOrchestrator {
    /// Create an orchestrator with the standard formulas and the system clock
    pub fn new(profiles: Arc<dyn ProfileSource>, storage: Arc<dyn GoalStorage>) -> Self {
        Self {
            profiles,
            storage,
            calculators: GoalCalculators::standard(),
            cache: FreshnessCache::new(),
            clock: Arc::new(SystemClock),
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_calculators(mut self, calculators: GoalCalculators) -> Self {
        self.calculators = calculators;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    /// Calculate a user's goals and persist them
    ///
    /// Unless `force_recalculation` is set, goals cached under the current
    /// profile fingerprint are returned without running the formulas or
    /// writing to storage.
    ///
    /// # Errors
    ///
    /// - `ProfileNotFound` if the profile source has no profile for the user
    /// - `ValidationFailed` if a field is missing or out of range
    /// - `CalculationFailed` if a formula faulted
    /// - `StorageFailed` if persisting failed; the computed goals travel with the error
    /// - `UnexpectedError` for profile source failures
    #[instrument(skip(self))]
    pub fn calculate_and_store(
        &self,
        user_id: &str,
        force_recalculation: bool,
    ) -> Result<GoalCalculationOutcome> {
        let slot = self.slot(user_id);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let result = self.run_locked(user_id, force_recalculation, &mut guard);
        let unknown_user = matches!(result, Err(GoalsError::ProfileNotFound { .. }));
        if let Err(err) = &result {
            guard.state = SlotState::Failed;
            log_failure(user_id, err);
        }
        drop(guard);

        if unknown_user {
            self.release_slot(user_id, &slot);
        }
        result
    }

    fn run_locked(
        &self,
        user_id: &str,
        force_recalculation: bool,
        slot: &mut UserSlot,
    ) -> Result<GoalCalculationOutcome> {
        let profile = self.load_profile(user_id)?;

        let now = self.clock.now();
        let today = now.date_naive();
        let input = CalculationInput::from_profile(&profile, today)?;
        let fingerprint = ProfileFingerprint::of(&profile, today);

        if !force_recalculation {
            if let Some(goals) = self.cache.get(user_id, &fingerprint) {
                slot.state = SlotState::Stored;
                return Ok(GoalCalculationOutcome {
                    goals,
                    was_recalculated: false,
                });
            }
        }

        let breakdown = match &profile.goal_overrides {
            Some(overrides) => Self::apply_overrides(user_id, &input, overrides, fingerprint.clone()),
            None => self.run_formulas(user_id, &input, fingerprint.clone())?,
        };

        let goals = DailyGoals::new(
            user_id,
            breakdown.steps_goal,
            breakdown.calories_goal,
            breakdown.heart_points_goal,
            breakdown.calculation_source,
            fingerprint.clone(),
            now,
        );
        slot.last_breakdown = Some(breakdown);

        if let Err(source) = self.storage.save_goals(&goals) {
            return Err(GoalsError::StorageFailed {
                goals: Box::new(goals),
                source,
            });
        }

        self.cache.put(user_id, fingerprint, goals.clone());
        slot.state = SlotState::Stored;

        info!(
            user_id,
            steps = goals.steps_goal,
            calories = goals.calories_goal,
            heart_points = goals.heart_points_goal,
            source = %goals.calculation_source,
            "Daily goals recalculated and stored"
        );

        Ok(GoalCalculationOutcome {
            goals,
            was_recalculated: true,
        })
    }

    fn load_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.profiles
            .get_profile(user_id)
            .map_err(|e| GoalsError::UnexpectedError(format!("profile lookup failed: {}", e)))?
            .ok_or_else(|| GoalsError::ProfileNotFound {
                user_id: user_id.to_string(),
            })
    }

    fn run_formulas(
        &self,
        user_id: &str,
        input: &CalculationInput,
        fingerprint: ProfileFingerprint,
    ) -> Result<GoalBreakdown> {
        let steps_goal = run_formula(self.calculators.steps.as_ref(), input)?;
        let calories_goal = run_formula(self.calculators.calories.as_ref(), input)?;
        let heart_points_goal = run_formula(self.calculators.heart_points.as_ref(), input)?;

        Ok(GoalBreakdown {
            user_id: user_id.to_string(),
            age: input.age(),
            age_band: input.age_band(),
            gender: input.gender(),
            activity_level: input.activity_level(),
            activity_factor: input.activity_level().factor(),
            bmr: CaloriesGoalCalculator::bmr(input),
            total_energy_expenditure: CaloriesGoalCalculator::total_energy_expenditure(input),
            steps_goal,
            calories_goal,
            heart_points_goal,
            calculation_source: CalculationSource::WhoStandard,
            profile_fingerprint: fingerprint,
        })
    }

    /// User-supplied goals skip the formulas but not the safety bands
    fn apply_overrides(
        user_id: &str,
        input: &CalculationInput,
        overrides: &GoalOverrides,
        fingerprint: ProfileFingerprint,
    ) -> GoalBreakdown {
        debug!(user_id, kind = ?overrides.kind, "Applying goal overrides");
        GoalBreakdown {
            user_id: user_id.to_string(),
            age: input.age(),
            age_band: input.age_band(),
            gender: input.gender(),
            activity_level: input.activity_level(),
            activity_factor: input.activity_level().factor(),
            bmr: None,
            total_energy_expenditure: None,
            steps_goal: GoalBounds::clamp_steps(overrides.steps),
            calories_goal: GoalBounds::clamp_calories(overrides.calories),
            heart_points_goal: GoalBounds::clamp_heart_points(overrides.heart_points),
            calculation_source: overrides.kind.source(),
            profile_fingerprint: fingerprint,
        }
    }

    /// True iff stored goals exist, are within bounds, and match the current profile
    pub fn has_valid_goals(&self, user_id: &str) -> bool {
        let profile = match self.profiles.get_profile(user_id) {
            Ok(Some(profile)) => profile,
            Ok(None) => return false,
            Err(e) => {
                warn!(user_id, error = %e, "Profile lookup failed while checking goals");
                return false;
            }
        };

        let stored = match self.storage.load_goals(user_id) {
            Ok(Some(goals)) => goals,
            Ok(None) => return false,
            Err(e) => {
                warn!(user_id, error = %e, "Goal lookup failed while checking goals");
                return false;
            }
        };

        let fingerprint = ProfileFingerprint::of(&profile, self.clock.today());
        if stored.profile_fingerprint != fingerprint {
            self.drop_stale_entry(user_id);
            return false;
        }

        stored.is_valid && stored.within_bounds()
    }

    /// Breakdown of the last calculation performed for a user in this process
    pub fn last_breakdown(&self, user_id: &str) -> Option<GoalBreakdown> {
        let slot = self.existing_slot(user_id)?;
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.last_breakdown.clone()
    }

    /// Where the user currently is in the goal lifecycle
    pub fn goal_state(&self, user_id: &str) -> GoalState {
        let slot_state = match self.existing_slot(user_id) {
            None => SlotState::NoGoals,
            Some(slot) => match slot.try_lock() {
                Ok(guard) => guard.state,
                Err(TryLockError::WouldBlock) => return GoalState::Computing,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().state,
            },
        };

        match slot_state {
            SlotState::Failed => GoalState::Failed,
            SlotState::Stored | SlotState::NoGoals => {
                let known = self
                    .cache
                    .fingerprint_for(user_id)
                    .or_else(|| self.stored_fingerprint(user_id));

                match known {
                    Some(fingerprint) => GoalState::Stored {
                        fresh: self.current_fingerprint(user_id).as_ref() == Some(&fingerprint),
                    },
                    None => GoalState::NoGoals,
                }
            }
        }
    }

    /// Best available goals for display; never fails
    ///
    /// Fresh cached goals first, then stored goals (flagged stale if the
    /// profile changed), then guideline defaults marked `FALLBACK_DEFAULT`.
    pub fn current_goals(&self, user_id: &str) -> DailyGoals {
        let fingerprint = self.current_fingerprint(user_id);

        if let Some(fingerprint) = &fingerprint {
            if let Some(goals) = self.cache.peek(user_id, fingerprint) {
                if goals.is_fresh {
                    return goals;
                }
            }
        }

        match self.storage.load_goals(user_id) {
            Ok(Some(stored)) => {
                let fresh = fingerprint.as_ref() == Some(&stored.profile_fingerprint);
                stored.with_freshness(fresh)
            }
            Ok(None) => self.fallback_goals(user_id),
            Err(e) => {
                warn!(user_id, error = %e, "Goal lookup failed, serving fallback defaults");
                self.fallback_goals(user_id)
            }
        }
    }

    fn fallback_goals(&self, user_id: &str) -> DailyGoals {
        DailyGoals::defaults(user_id, CalculationSource::FallbackDefault, self.clock.now())
    }

    /// Drop the cached goals so the next call recalculates
    pub fn invalidate(&self, user_id: &str) -> bool {
        self.cache.invalidate(user_id)
    }

    /// Run `calculate_and_store` for many users in parallel
    ///
    /// Results are returned in input order.
    pub fn calculate_batch(
        &self,
        user_ids: &[String],
        force_recalculation: bool,
    ) -> Vec<(String, Result<GoalCalculationOutcome>)> {
        user_ids
            .par_iter()
            .map(|user_id| {
                (
                    user_id.clone(),
                    self.calculate_and_store(user_id, force_recalculation),
                )
            })
            .collect()
    }

    fn slot(&self, user_id: &str) -> Arc<Mutex<UserSlot>> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(users.entry(user_id.to_string()).or_default())
    }

    /// Forget a slot nobody else holds; unknown users must not accumulate
    fn release_slot(&self, user_id: &str, slot: &Arc<Mutex<UserSlot>>) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let unshared = users
            .get(user_id)
            .is_some_and(|existing| Arc::ptr_eq(existing, slot) && Arc::strong_count(slot) == 2);
        if unshared {
            users.remove(user_id);
        }
    }

    /// Invalidate the cache entry only if it no longer matches the profile.
    /// Runs under the user's slot lock so it cannot clobber a concurrent recalculation.
    fn drop_stale_entry(&self, user_id: &str) {
        let slot = self.existing_slot(user_id);
        let _guard = slot
            .as_ref()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner));

        let current = self.current_fingerprint(user_id);
        let cached = self.cache.fingerprint_for(user_id);
        if cached.is_some() && cached != current {
            debug!(user_id, "Stored goals are stale, dropping cache entry");
            self.cache.invalidate(user_id);
        }
    }

    fn existing_slot(&self, user_id: &str) -> Option<Arc<Mutex<UserSlot>>> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    fn current_fingerprint(&self, user_id: &str) -> Option<ProfileFingerprint> {
        match self.profiles.get_profile(user_id) {
            Ok(profile) => profile.map(|p| ProfileFingerprint::of(&p, self.clock.today())),
            Err(e) => {
                warn!(user_id, error = %e, "Profile lookup failed");
                None
            }
        }
    }

    fn stored_fingerprint(&self, user_id: &str) -> Option<ProfileFingerprint> {
        match self.storage.load_goals(user_id) {
            Ok(goals) => goals.map(|g| g.profile_fingerprint),
            Err(e) => {
                warn!(user_id, error = %e, "Goal lookup failed");
                None
            }
        }
    }
}

/// Run one formula, converting a panic into `CalculationFailed`
fn run_formula(formula: &dyn GoalFormula, input: &CalculationInput) -> Result<u32> {
    panic::catch_unwind(AssertUnwindSafe(|| formula.calculate(input))).map_err(|payload| {
        GoalsError::CalculationFailed {
            calculator: formula.name().to_string(),
            reason: panic_message(payload.as_ref()),
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_failure(user_id: &str, err: &GoalsError) {
    match err.severity() {
        ErrorSeverity::Critical | ErrorSeverity::Error => {
            error!(user_id, kind = err.kind(), error = %err, "Goal calculation failed")
        }
        ErrorSeverity::Warning => {
            warn!(user_id, kind = err.kind(), error = %err, "Goal calculation failed")
        }
        ErrorSeverity::Info => {
            info!(user_id, kind = err.kind(), error = %err, "Goal calculation skipped")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::input::AgeBand;
    use crate::models::{ActivityLevel, Gender, OverrideKind};
    use crate::storage::InMemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn setup() -> (Arc<InMemoryStore>, GoalCalculationOrchestrator) {
        let store = Arc::new(InMemoryStore::new());
        let orchestrator = GoalCalculationOrchestrator::new(store.clone(), store.clone())
            .with_clock(Arc::new(FixedClock::at_date(today())));
        (store, orchestrator)
    }

    fn adult_profile(user_id: &str) -> UserProfile {
        UserProfile::new(user_id)
            .with_birthdate(NaiveDate::from_ymd_opt(1994, 1, 10).unwrap())
            .with_gender(Gender::Male)
            .with_height_cm(dec!(180))
            .with_weight_kg(dec!(75))
            .with_activity_level(ActivityLevel::Sedentary)
    }

    #[test]
    fn test_breakdown_recorded() {
        let (store, orchestrator) = setup();
        store.upsert_profile(adult_profile("u1"));

        assert!(orchestrator.last_breakdown("u1").is_none());
        orchestrator.calculate_and_store("u1", false).unwrap();

        let breakdown = orchestrator.last_breakdown("u1").unwrap();
        assert_eq!(breakdown.age, 30);
        assert_eq!(breakdown.age_band, AgeBand::Adult);
        assert_eq!(breakdown.activity_factor, dec!(1.2));
        assert_eq!(breakdown.bmr, Some(dec!(1786.647)));
        assert_eq!(breakdown.calories_goal, 2144);
        assert_eq!(breakdown.calculation_source, CalculationSource::WhoStandard);
    }

    #[test]
    fn test_overrides_are_clamped() {
        let (store, orchestrator) = setup();
        store.upsert_profile(adult_profile("u1").with_overrides(GoalOverrides {
            kind: OverrideKind::Manual,
            steps: 40_000,
            calories: 800,
            heart_points: 30,
        }));

        let outcome = orchestrator.calculate_and_store("u1", false).unwrap();
        assert_eq!(outcome.goals.steps_goal, 20_000);
        assert_eq!(outcome.goals.calories_goal, 1_200);
        assert_eq!(outcome.goals.heart_points_goal, 30);
        assert_eq!(outcome.goals.calculation_source, CalculationSource::Manual);
        assert!(outcome.goals.is_valid);

        let breakdown = orchestrator.last_breakdown("u1").unwrap();
        assert!(breakdown.bmr.is_none());
    }

    #[test]
    fn test_goal_state_transitions() {
        let (store, orchestrator) = setup();
        assert_eq!(orchestrator.goal_state("u1"), GoalState::NoGoals);

        // Unknown users leave nothing behind
        assert!(orchestrator.calculate_and_store("u1", false).is_err());
        assert_eq!(orchestrator.goal_state("u1"), GoalState::NoGoals);

        // An incomplete profile fails the run
        store.upsert_profile(UserProfile::new("u1"));
        assert!(orchestrator.calculate_and_store("u1", false).is_err());
        assert_eq!(orchestrator.goal_state("u1"), GoalState::Failed);

        store.upsert_profile(adult_profile("u1"));
        orchestrator.calculate_and_store("u1", false).unwrap();
        assert_eq!(orchestrator.goal_state("u1"), GoalState::Stored { fresh: true });

        store.upsert_profile(adult_profile("u1").with_weight_kg(dec!(80)));
        assert_eq!(orchestrator.goal_state("u1"), GoalState::Stored { fresh: false });
    }

    #[test]
    fn test_unknown_users_are_not_tracked() {
        let (_store, orchestrator) = setup();

        for i in 0..1000 {
            let user_id = format!("ghost_{}", i);
            let err = orchestrator.calculate_and_store(&user_id, false).unwrap_err();
            assert!(matches!(err, GoalsError::ProfileNotFound { .. }));
        }

        assert!(orchestrator.users.lock().unwrap().is_empty());
        assert_eq!(orchestrator.goal_state("ghost_0"), GoalState::NoGoals);
        assert!(orchestrator.last_breakdown("ghost_0").is_none());
    }

    #[test]
    fn test_known_user_slot_survives_failure() {
        let (store, orchestrator) = setup();
        store.upsert_profile(UserProfile::new("u1"));

        assert!(orchestrator.calculate_and_store("u1", false).is_err());
        assert!(orchestrator.users.lock().unwrap().contains_key("u1"));
    }

    #[test]
    fn test_fallback_defaults_use_injected_clock() {
        let (_store, orchestrator) = setup();

        let fallback = orchestrator.current_goals("nobody");
        assert_eq!(fallback.calculation_source, CalculationSource::FallbackDefault);
        assert_eq!(fallback.calculated_at, today().and_hms_opt(0, 0, 0).unwrap().and_utc());
    }

    #[test]
    fn test_goal_state_from_storage_without_slot() {
        let (store, orchestrator) = setup();
        store.upsert_profile(adult_profile("u1"));
        orchestrator.calculate_and_store("u1", false).unwrap();

        // A second orchestrator over the same store has no in-process history
        let other = GoalCalculationOrchestrator::new(store.clone(), store.clone())
            .with_clock(Arc::new(FixedClock::at_date(today())));
        assert_eq!(other.goal_state("u1"), GoalState::Stored { fresh: true });
        assert!(other.has_valid_goals("u1"));
    }

    #[test]
    fn test_current_goals_fallback() {
        let (store, orchestrator) = setup();

        let fallback = orchestrator.current_goals("nobody");
        assert_eq!(fallback.calculation_source, CalculationSource::FallbackDefault);
        assert_eq!(fallback.steps_goal, DailyGoals::DEFAULT_STEPS);

        store.upsert_profile(adult_profile("u1"));
        let stored = orchestrator.calculate_and_store("u1", false).unwrap().goals;
        assert_eq!(orchestrator.current_goals("u1").id, stored.id);

        store.upsert_profile(adult_profile("u1").with_weight_kg(dec!(90)));
        let stale = orchestrator.current_goals("u1");
        assert_eq!(stale.id, stored.id);
        assert!(!stale.is_fresh);
    }

    #[test]
    fn test_invalidate_forces_recalculation() {
        let (store, orchestrator) = setup();
        store.upsert_profile(adult_profile("u1"));

        orchestrator.calculate_and_store("u1", false).unwrap();
        assert!(orchestrator.invalidate("u1"));

        let outcome = orchestrator.calculate_and_store("u1", false).unwrap();
        assert!(outcome.was_recalculated);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}

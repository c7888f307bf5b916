// Library interface for GoalRS modules
// This allows integration tests and the CLI to access the core functionality

pub mod cache;
pub mod calculators;
pub mod calories;
pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod heart_points;
pub mod input;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod steps;
pub mod storage;

// Re-export commonly used types for convenience
pub use models::*;
pub use cache::{CacheMetrics, FreshnessCache};
pub use calculators::{GoalCalculators, GoalFormula};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use error::{ErrorSeverity, FieldViolation, GoalsError, Result, StorageError};
pub use fingerprint::ProfileFingerprint;
pub use input::{AgeBand, CalculationInput};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use orchestrator::{GoalCalculationOrchestrator, GoalCalculationOutcome, GoalState};
pub use storage::{GoalStorage, InMemoryStore, ProfileSource, SqliteStore};

//! Closed error taxonomy for goal calculation
//!
//! Every fault crossing the orchestrator boundary becomes one of the
//! [`GoalsError`] kinds. None of them are fatal to the host process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::DailyGoals;

/// A single rejected input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, "required")
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

fn describe_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Top-level error type for goal calculation
#[derive(Debug, Error)]
pub enum GoalsError {
    /// No profile exists for the user
    #[error("Profile not found for user {user_id}")]
    ProfileNotFound { user_id: String },

    /// One or more input fields missing or out of range
    #[error("Validation failed: {}", describe_violations(.violations))]
    ValidationFailed { violations: Vec<FieldViolation> },

    /// A calculator faulted
    #[error("Calculation failed in {calculator}: {reason}")]
    CalculationFailed { calculator: String, reason: String },

    /// Goals were computed but could not be persisted; `goals` is still usable
    #[error("Storage failed, goals not persisted: {source}")]
    StorageFailed {
        goals: Box<DailyGoals>,
        #[source]
        source: StorageError,
    },

    /// Anything not classified above
    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

/// Errors raised by profile sources and goal storage
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend cannot be reached
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    /// Write rejected or interrupted
    #[error("Write failed: {reason}")]
    WriteFailed { reason: String },

    /// Stored payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite backend error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// Transient failures worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable { .. } | StorageError::WriteFailed { .. }
        )
    }
}

/// Result type alias for goal operations
pub type Result<T> = std::result::Result<T, GoalsError>;

impl GoalsError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            GoalsError::CalculationFailed { .. } => true,
            GoalsError::StorageFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Goals computed before the failure, if any
    pub fn computed_goals(&self) -> Option<&DailyGoals> {
        match self {
            GoalsError::StorageFailed { goals, .. } => Some(goals.as_ref()),
            _ => None,
        }
    }

    /// Short machine-readable kind name
    pub fn kind(&self) -> &'static str {
        match self {
            GoalsError::ProfileNotFound { .. } => "ProfileNotFound",
            GoalsError::ValidationFailed { .. } => "ValidationFailed",
            GoalsError::CalculationFailed { .. } => "CalculationFailed",
            GoalsError::StorageFailed { .. } => "StorageFailed",
            GoalsError::UnexpectedError(_) => "UnexpectedError",
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GoalsError::ProfileNotFound { .. } => ErrorSeverity::Info,
            GoalsError::ValidationFailed { .. } => ErrorSeverity::Warning,
            GoalsError::StorageFailed { .. } => ErrorSeverity::Warning,
            GoalsError::CalculationFailed { .. } => ErrorSeverity::Error,
            GoalsError::UnexpectedError(_) => ErrorSeverity::Critical,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            GoalsError::ProfileNotFound { .. } => {
                "Please complete your profile so we can calculate your daily goals.".to_string()
            }
            GoalsError::ValidationFailed { violations } => {
                let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
                format!("Please check these profile fields: {}", fields.join(", "))
            }
            GoalsError::CalculationFailed { .. } => {
                "We couldn't calculate your goals right now. Please try again.".to_string()
            }
            GoalsError::StorageFailed { .. } => {
                "Your goals were calculated but not saved yet. They will be saved on the next attempt."
                    .to_string()
            }
            GoalsError::UnexpectedError(_) => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

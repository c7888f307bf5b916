//! Profile source and goal storage collaborators
//!
//! The engine consumes these two narrow interfaces and owns no persisted
//! layout beyond the `DailyGoals` fields. Two adapters ship with the crate:
//! [`InMemoryStore`] for tests and embedding, [`SqliteStore`] for the CLI.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

use crate::error::StorageError;
use crate::models::{DailyGoals, UserProfile};

/// Source of user profiles
pub trait ProfileSource: Send + Sync {
    /// Current profile for a user, None if the user has none
    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError>;
}

/// Sink for computed goals
pub trait GoalStorage: Send + Sync {
    /// Persist goals; the newest saved goals supersede older ones
    fn save_goals(&self, goals: &DailyGoals) -> Result<(), StorageError>;

    /// Most recently saved goals for a user
    fn load_goals(&self, user_id: &str) -> Result<Option<DailyGoals>, StorageError>;
}

/// Thread-safe in-memory profile and goal store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
    goals: RwLock<HashMap<String, Vec<DailyGoals>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile
    pub fn upsert_profile(&self, profile: UserProfile) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.user_id.clone(), profile);
    }

    pub fn remove_profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
    }

    /// All goals ever saved for a user, newest first
    pub fn goal_history(&self, user_id: &str) -> Vec<DailyGoals> {
        self.goals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map(|history| history.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

impl ProfileSource for InMemoryStore {
    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
        Ok(self
            .profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned())
    }
}

impl GoalStorage for InMemoryStore {
    fn save_goals(&self, goals: &DailyGoals) -> Result<(), StorageError> {
        self.goals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(goals.user_id.clone())
            .or_default()
            .push(goals.clone());
        Ok(())
    }

    fn load_goals(&self, user_id: &str) -> Result<Option<DailyGoals>, StorageError> {
        Ok(self
            .goals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .and_then(|history| history.last().cloned()))
    }
}

/// SQLite-backed profile and goal store
///
/// Rows keep a few indexed key columns next to the JSON-serialized record.
/// Saved goals are appended, never overwritten.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a store at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Store backed by a private in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        // WAL for concurrent readers; in-memory databases silently keep "memory"
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            r#"
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_goals (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                calculated_at TEXT NOT NULL,
                seq INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_daily_goals_user_seq ON daily_goals (user_id, seq);
            "#,
        )?;
        Ok(())
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a profile
    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let data = serde_json::to_string(profile)?;
        self.connection().execute(
            "INSERT OR REPLACE INTO user_profiles (user_id, data, updated_at) VALUES (?1, ?2, ?3)",
            params![profile.user_id, data, profile.updated_at.to_rfc3339()],
        )?;
        debug!(user_id = %profile.user_id, "Stored profile");
        Ok(())
    }

    /// All goals saved for a user, newest first
    pub fn goal_history(&self, user_id: &str) -> Result<Vec<DailyGoals>, StorageError> {
        let conn = self.connection();
        let mut stmt =
            conn.prepare("SELECT data FROM daily_goals WHERE user_id = ?1 ORDER BY seq DESC")?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;

        let mut history = Vec::new();
        for data in rows {
            history.push(serde_json::from_str(&data?)?);
        }
        Ok(history)
    }
}

impl ProfileSource for SqliteStore {
    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
        let data: Option<String> = self
            .connection()
            .query_row(
                "SELECT data FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StorageError::from)
    }
}

impl GoalStorage for SqliteStore {
    fn save_goals(&self, goals: &DailyGoals) -> Result<(), StorageError> {
        let data = serde_json::to_string(goals)?;
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM daily_goals WHERE user_id = ?1",
            params![goals.user_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO daily_goals (id, user_id, calculated_at, seq, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                goals.id,
                goals.user_id,
                goals.calculated_at.to_rfc3339(),
                next_seq,
                data
            ],
        )?;
        tx.commit()?;

        debug!(user_id = %goals.user_id, seq = next_seq, "Stored daily goals");
        Ok(())
    }

    fn load_goals(&self, user_id: &str) -> Result<Option<DailyGoals>, StorageError> {
        let data: Option<String> = self
            .connection()
            .query_row(
                "SELECT data FROM daily_goals WHERE user_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StorageError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityLevel, CalculationSource, Gender};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn profile(user_id: &str) -> UserProfile {
        UserProfile::new(user_id)
            .with_birthdate(NaiveDate::from_ymd_opt(1990, 5, 20).unwrap())
            .with_gender(Gender::Female)
            .with_height_cm(dec!(168.5))
            .with_weight_kg(dec!(61.2))
            .with_activity_level(ActivityLevel::Active)
    }

    #[test]
    fn test_in_memory_profiles() {
        let store = InMemoryStore::new();
        assert!(store.get_profile("u1").unwrap().is_none());

        let original = profile("u1");
        store.upsert_profile(original.clone());
        assert_eq!(store.get_profile("u1").unwrap().unwrap(), original);

        assert!(store.remove_profile("u1").is_some());
        assert!(store.get_profile("u1").unwrap().is_none());
    }

    #[test]
    fn test_in_memory_goals_superseded_not_deleted() {
        let store = InMemoryStore::new();
        let first = DailyGoals::defaults("u1", CalculationSource::WhoStandard, chrono::Utc::now());
        let second = DailyGoals::defaults("u1", CalculationSource::Manual, chrono::Utc::now());

        store.save_goals(&first).unwrap();
        store.save_goals(&second).unwrap();

        assert_eq!(store.load_goals("u1").unwrap().unwrap().id, second.id);
        let history = store.goal_history("u1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].id, first.id);
        assert!(store.load_goals("u2").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_profile_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("goals.db")).unwrap();

        let original = profile("u1");
        store.upsert_profile(&original).unwrap();

        let loaded = store.get_profile("u1").unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(store.get_profile("missing").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_goals_newest_wins() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = DailyGoals::defaults("u1", CalculationSource::WhoStandard, chrono::Utc::now());
        let second = DailyGoals::defaults("u1", CalculationSource::UserAdjusted, chrono::Utc::now());

        store.save_goals(&first).unwrap();
        store.save_goals(&second).unwrap();

        let latest = store.load_goals("u1").unwrap().unwrap();
        assert_eq!(latest, second);

        let history = store.goal_history("u1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);

        assert!(store.load_goals("u2").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("goals.db");
        let goals = DailyGoals::defaults("u1", CalculationSource::WhoStandard, chrono::Utc::now());

        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_goals(&goals).unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load_goals("u1").unwrap().unwrap(), goals);
    }
}

use crate::domain::models::LockState;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_database;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const LOCK_END_TIME_KEY: &str = "lockEndTime";

pub trait LockStateRepository: Send + Sync {
    fn load(&self) -> Result<LockState, InfraError>;
    fn save(&self, lock_end_time: i64) -> Result<(), InfraError>;
    fn clear(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteLockStateRepository {
    db_path: PathBuf,
}

impl SqliteLockStateRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_database(&self.db_path)
            .map_err(|error| InfraError::Storage(format!("open {}: {error}", self.db_path.display())))
    }
}

impl LockStateRepository for SqliteLockStateRepository {
    fn load(&self) -> Result<LockState, InfraError> {
        let connection = self.connect()?;
        let lock_end_time: Option<i64> = connection
            .query_row(
                "SELECT value FROM lock_state WHERE key = ?1",
                params![LOCK_END_TIME_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|error| InfraError::Storage(format!("read {LOCK_END_TIME_KEY}: {error}")))?;
        Ok(LockState { lock_end_time })
    }

    fn save(&self, lock_end_time: i64) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO lock_state (key, value)
                 VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![LOCK_END_TIME_KEY, lock_end_time],
            )
            .map_err(|error| InfraError::Storage(format!("write {LOCK_END_TIME_KEY}: {error}")))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection
            .execute(
                "DELETE FROM lock_state WHERE key = ?1",
                params![LOCK_END_TIME_KEY],
            )
            .map_err(|error| InfraError::Storage(format!("remove {LOCK_END_TIME_KEY}: {error}")))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLockStateRepository {
    state: Mutex<LockState>,
}

impl InMemoryLockStateRepository {
    pub fn with_state(state: LockState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl LockStateRepository for InMemoryLockStateRepository {
    fn load(&self) -> Result<LockState, InfraError> {
        let state = self
            .state
            .lock()
            .map_err(|error| InfraError::Storage(format!("lock state lock poisoned: {error}")))?;
        Ok(*state)
    }

    fn save(&self, lock_end_time: i64) -> Result<(), InfraError> {
        let mut state = self
            .state
            .lock()
            .map_err(|error| InfraError::Storage(format!("lock state lock poisoned: {error}")))?;
        *state = LockState::until(lock_end_time);
        Ok(())
    }

    fn clear(&self) -> Result<(), InfraError> {
        let mut state = self
            .state
            .lock()
            .map_err(|error| InfraError::Storage(format!("lock state lock poisoned: {error}")))?;
        *state = LockState::unlocked();
        Ok(())
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error("Rule update failure: {0}")]
    RuleUpdate(String),
    #[error("Scheduler failure: {0}")]
    Scheduler(String),
    #[error("Tab operation failure: {0}")]
    TabOperation(String),
}

use crate::infrastructure::error::InfraError;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const LOCK_SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

pub fn open_database(path: &Path) -> Result<Connection, InfraError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    Ok(connection)
}

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = open_database(path)?;
    connection.execute_batch(LOCK_SCHEMA_SQL)?;
    Ok(())
}

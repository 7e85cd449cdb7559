//! SQLite-backed message table.
//!
//! Every operation opens its own connection, runs a single statement and
//! closes the connection again. Nothing is cached in memory, so handlers on
//! different connections only meet inside the database.

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    msg TEXT NOT NULL
)";

const INSERT_MESSAGE: &str = "INSERT INTO logs (msg) VALUES (?1)";

const SELECT_MESSAGES: &str = "SELECT id, msg FROM logs ORDER BY id ASC";

/// A single stored message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Auto-incremented row id
    pub id: i64,
    /// Message text as received
    pub msg: String,
}

/// Storage errors
#[derive(Debug)]
pub enum StorageError {
    /// The database directory could not be created
    CreateDir(PathBuf, std::io::Error),
    /// The database could not be opened
    Open(PathBuf, rusqlite::Error),
    /// A statement failed
    Query(rusqlite::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::CreateDir(path, e) => {
                write!(f, "failed to create directory '{}': {}", path.display(), e)
            }
            StorageError::Open(path, e) => {
                write!(f, "failed to open '{}': {}", path.display(), e)
            }
            StorageError::Query(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::CreateDir(_, e) => Some(e),
            StorageError::Open(_, e) | StorageError::Query(e) => Some(e),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Query(e)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Message table stored in a SQLite file
#[derive(Debug)]
pub struct MessageStore {
    /// Database file
    path: PathBuf,
    /// How long a connection waits for another writer's lock
    busy_timeout: Duration,
}

impl MessageStore {
    /// Create a new store handle. Nothing is opened until the first operation.
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Arc<Self> {
        let path = path.into();
        info!(path = %path.display(), "Initializing message store");
        Arc::new(Self { path, busy_timeout })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the database file and the `logs` table if they don't exist yet
    pub fn init(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::CreateDir(parent.to_path_buf(), e))?;
            }
        }

        let conn = self.open()?;
        conn.execute(CREATE_TABLE, [])?;
        debug!(path = %self.path.display(), "Message table ready");
        Ok(())
    }

    /// Store a message, returning its id
    pub fn insert(&self, msg: &str) -> StorageResult<i64> {
        let conn = self.open()?;
        conn.execute(INSERT_MESSAGE, params![msg])?;
        let id = conn.last_insert_rowid();
        trace!(id, "Message stored");
        Ok(id)
    }

    /// All stored messages in ascending id order
    pub fn list(&self) -> StorageResult<Vec<LogEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(SELECT_MESSAGES)?;
        let entries = stmt
            .query_map([], |row| {
                Ok(LogEntry {
                    id: row.get(0)?,
                    msg: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        trace!(count = entries.len(), "Messages listed");
        Ok(entries)
    }

    fn open(&self) -> StorageResult<Connection> {
        let conn = Connection::open(&self.path)
            .map_err(|e| StorageError::Open(self.path.clone(), e))?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

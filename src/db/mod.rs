//! SQLite persistence for the tracking pipeline.
//!
//! The database lives at `~/.fieldtrack/tracker.db` and is the durable store
//! for the person registry, the append-only message archive, and the poll
//! cursor. Everything the dashboard reads is derived from these tables.

use std::path::PathBuf;

use rusqlite::Connection;
use thiserror::Error;

pub mod cursor;
pub mod hikers;
pub mod messages;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Hiker not found: {0}")]
    HikerNotFound(String),
}

/// SQLite connection wrapper for registry, archive, and cursor state.
///
/// Intentionally NOT `Clone` or `Sync`. Each task opens its own connection;
/// WAL mode keeps concurrent readers cheap while the poller owns writes.
pub struct TrackerDb {
    conn: Connection,
}

impl TrackerDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) the database at `~/.fieldtrack/tracker.db` and apply
    /// pending migrations.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Canonical database path (`~/.fieldtrack/tracker.db`).
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".fieldtrack").join("tracker.db"))
    }
}

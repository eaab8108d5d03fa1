//! Local credential database
//!
//! A single SQLite table of named slots. The client only ever uses one slot
//! (the session token), but the table is keyed so the slot name is explicit.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS credential_slots (
    slot TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct CredentialDb {
    conn: Arc<Mutex<Connection>>,
}

impl CredentialDb {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a slot; `None` if it was never written or has been removed
    pub fn get(&self, slot: &str) -> DbResult<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT value FROM credential_slots WHERE slot = ?1",
            params![slot],
            |row| row.get(0),
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Write a slot, replacing any previous value
    pub fn set(&self, slot: &str, value: &str) -> DbResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO credential_slots (slot, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(slot) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![slot, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove a slot. Removing a missing slot is not an error.
    pub fn remove(&self, slot: &str) -> DbResult<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM credential_slots WHERE slot = ?1", params![slot])?;
        Ok(())
    }
}

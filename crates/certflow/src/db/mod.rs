//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`, and every write
//! path runs inside an IMMEDIATE transaction so the holder owns the write
//! lock from its first read.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

pub mod certificate_repo;
pub mod error;
pub mod history_repo;
pub mod job_repo;
pub mod migrations;
pub mod non_conformity_repo;
pub mod payment_repo;
pub mod survey_repo;

pub use error::DatabaseError;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). Concurrent callers queue on the mutex,
/// which is what gives row-level read-modify-write exclusivity: whoever holds
/// the guard holds the only live transaction. A thread that asks for the
/// connection while it already holds it gets [`DatabaseError::Reentrant`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    holder: Arc<Mutex<Option<ThreadId>>>,
}

/// The locked connection; clears the holder on drop.
struct Held<'a> {
    conn: MutexGuard<'a, Connection>,
    holder: &'a Mutex<Option<ThreadId>>,
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        if let Ok(mut holder) = self.holder.lock() {
            *holder = None;
        }
    }
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self::wrap(conn))
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self::wrap(conn))
    }

    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            holder: Arc::new(Mutex::new(None)),
        }
    }

    fn acquire(&self) -> Result<Held<'_>, DatabaseError> {
        let me = thread::current().id();
        if *self.holder.lock().map_err(|_| DatabaseError::LockPoisoned)? == Some(me) {
            return Err(DatabaseError::Reentrant);
        }

        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        *self.holder.lock().map_err(|_| DatabaseError::LockPoisoned)? = Some(me);
        Ok(Held {
            conn,
            holder: &self.holder,
        })
    }

    /// Provides locked access to the underlying connection, outside any
    /// explicit transaction. Intended for unlocked (possibly stale) reads.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let held = self.acquire()?;
        f(&held.conn)
    }

    /// Runs `f` inside an IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`. Any `Err` drops the transaction, which
    /// rolls it back before the mutex is released.
    pub fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut held = self.acquire()?;
        let tx = held
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;

        let value = f(&tx)?;

        tx.commit().map_err(DatabaseError::from)?;
        Ok(value)
    }
}

/// Returns the canonical database path: `~/.certflow/data/certflow.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".certflow").join("data").join("certflow.db"))
}

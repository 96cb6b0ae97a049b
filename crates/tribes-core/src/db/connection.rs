//! Database connection management

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use super::migrations;
use crate::error::{Error, Result};

/// Default bound on how long a storage call may wait for a lock
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wrapper for a `SQLite` connection
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let database = Self { conn };
        database.configure(busy_timeout)?;
        database.migrate()?;
        tracing::debug!("Opened database at {}", path.display());
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let database = Self { conn };
        database.configure(DEFAULT_STORAGE_TIMEOUT)?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for concurrent readers and bounded lock waits
    fn configure(&self, busy_timeout: Duration) -> Result<()> {
        // WAL is unavailable for in-memory databases; the pragma just reports "memory"
        self.conn
            .pragma_update(None, "journal_mode", "WAL")
            .ok();
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn.busy_timeout(busy_timeout)?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    #[cfg(test)]
    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// Cloneable handle to a database shared between tasks
///
/// Every acquisition is bounded by the storage timeout so a wedged caller
/// cannot stall the others indefinitely.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
    lock_timeout: Duration,
}

impl SharedDatabase {
    pub fn new(db: Database, lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
            lock_timeout,
        }
    }

    /// Acquire the database, failing once the storage timeout elapses
    pub async fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        tokio::time::timeout(self.lock_timeout, self.inner.lock())
            .await
            .map_err(|_| {
                Error::Database(format!(
                    "timed out after {:?} waiting for the database",
                    self.lock_timeout
                ))
            })
    }

    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

pub mod conversations;
pub mod error;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reactions;
pub mod users;
pub mod views;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use tracing::info;

pub use conversations::RemovalPolicy;
pub use error::{ChatError, Result};

const READER_POOL_SIZE: usize = 4;

/// SQLite-backed entity store.
///
/// All writes go through a single writer connection, each inside its own
/// IMMEDIATE transaction, so read-check-then-write sequences are serialized.
/// Reads are spread over a small pool of read-only connections.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Private in-memory database. Reads share the writer connection.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let writer = Connection::open_in_memory()?;
        writer.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&writer)?;

        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Runs a read-only closure on one of the reader connections.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            let conn = self
                .writer
                .lock()
                .map_err(|e| ChatError::Internal(format!("Writer lock poisoned: {}", e)))?;
            return f(&conn);
        }

        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| ChatError::Internal(format!("Reader lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Unit of work: runs `f` inside one IMMEDIATE transaction on the writer.
    ///
    /// Commits when `f` returns `Ok`. Any error (or a panic) drops the
    /// transaction, which rolls it back.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| ChatError::Internal(format!("Writer lock poisoned: {}", e)))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Current time at the precision the store keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Blank means absent: `None`, empty, or whitespace only.
pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Database;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    /// Inserts a user directly, skipping password hashing to keep tests fast.
    pub fn user(db: &Database, username: &str) -> i64 {
        db.with_tx(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password_hash, created_at)
                 VALUES (?1, ?2, 'x', ?3)",
                rusqlite::params![username, format!("{}@example.com", username), super::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .unwrap()
    }

    /// Inserts `count` live messages in one transaction and returns their ids
    /// oldest first.
    pub fn bulk_messages(db: &Database, conversation_id: i64, sender_id: i64, count: usize) -> Vec<i64> {
        db.with_tx(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO messages (conversation_id, sender_id, content, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let sent_at = super::now();
            let mut ids = Vec::with_capacity(count);
            for i in 0..count {
                stmt.execute(rusqlite::params![conversation_id, sender_id, format!("m{}", i), sent_at])?;
                ids.push(conn.last_insert_rowid());
            }
            Ok(ids)
        })
        .unwrap()
    }
}

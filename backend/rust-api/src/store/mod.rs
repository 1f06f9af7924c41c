//! Local authoritative store.
//!
//! SQLite in WAL mode: one writer connection plus a small pool of read-only
//! connections. Every call runs on the blocking pool so a slow statement never
//! stalls the runtime. The remote mirror is only consulted on pull.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::metrics::{STORE_OPERATIONS_TOTAL, STORE_OPERATION_DURATION_SECONDS};

pub mod profiles;
pub mod progress;
pub mod questions;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS profiles (
    identity TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    level INTEGER NOT NULL DEFAULT 1,
    xp INTEGER NOT NULL DEFAULT 0,
    total_score INTEGER NOT NULL DEFAULT 0,
    mastery INTEGER NOT NULL DEFAULT 0,
    lives INTEGER NOT NULL DEFAULT 3,
    questions_answered INTEGER NOT NULL DEFAULT 0,
    streak INTEGER NOT NULL DEFAULT 0,
    crisis_wins INTEGER NOT NULL DEFAULT 0,
    redemptions INTEGER NOT NULL DEFAULT 0,
    joker_fifty INTEGER NOT NULL DEFAULT 3,
    joker_hint INTEGER NOT NULL DEFAULT 3,
    has_diploma INTEGER NOT NULL DEFAULT 0,
    crisis_active INTEGER NOT NULL DEFAULT 0,
    crisis_started_at_ms INTEGER,
    crisis_question_id INTEGER,
    last_seen_ms INTEGER
);

CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    concept TEXT,
    level INTEGER NOT NULL,
    prompt TEXT NOT NULL,
    options TEXT NOT NULL,
    correct TEXT NOT NULL,
    explanation TEXT NOT NULL DEFAULT '',
    theory TEXT,
    example TEXT,
    tip TEXT,
    triad_id TEXT,
    triad_position INTEGER NOT NULL DEFAULT 0,
    origin TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_questions_level_position
    ON questions(level, triad_position, id);
CREATE INDEX IF NOT EXISTS idx_questions_level_id ON questions(level, id);

CREATE TABLE IF NOT EXISTS solved (
    identity TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    PRIMARY KEY (identity, fingerprint)
);

CREATE TABLE IF NOT EXISTS failures (
    identity TEXT NOT NULL,
    question_id INTEGER NOT NULL,
    failed_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_failures_lookup
    ON failures(identity, question_id, failed_at_ms);
CREATE INDEX IF NOT EXISTS idx_failures_age ON failures(failed_at_ms);

CREATE TABLE IF NOT EXISTS category_stats (
    identity TEXT NOT NULL,
    category TEXT NOT NULL,
    correct_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (identity, category)
);

CREATE TABLE IF NOT EXISTS glossary (
    identity TEXT NOT NULL,
    term TEXT NOT NULL,
    definition TEXT NOT NULL,
    category TEXT NOT NULL,
    PRIMARY KEY (identity, term)
);

CREATE TABLE IF NOT EXISTS difficulty_votes (
    question_id INTEGER PRIMARY KEY,
    hard_votes INTEGER NOT NULL DEFAULT 0,
    easy_votes INTEGER NOT NULL DEFAULT 0
);
";

/// Handle to the local store. Cloning shares the same connections.
#[derive(Clone)]
pub struct LocalStore {
    /// Slot 0 is the writer; any further slots are read-only.
    conns: Arc<Vec<Mutex<Connection>>>,
    next_reader: Arc<AtomicUsize>,
}

impl LocalStore {
    /// Open (or create) the database file, apply the schema and open
    /// `readers` read-only connections next to the writer.
    pub fn open(path: impl AsRef<Path>, readers: usize) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Invalid(format!("cannot create {:?}: {}", parent, e)))?;
            }
        }

        let writer = Connection::open(path)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "synchronous", "NORMAL")?;
        let writer = prepare(writer)?;

        let mut conns = vec![Mutex::new(writer)];
        for _ in 0..readers {
            let reader = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            reader.busy_timeout(BUSY_TIMEOUT)?;
            conns.push(Mutex::new(reader));
        }

        info!(readers, "Local store opened at {}", path.display());
        Ok(Self::from_connections(conns))
    }

    /// Private in-memory database. Reads share the writer connection.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = prepare(Connection::open_in_memory()?)?;
        Ok(Self::from_connections(vec![Mutex::new(conn)]))
    }

    fn from_connections(conns: Vec<Mutex<Connection>>) -> Self {
        Self {
            conns: Arc::new(conns),
            next_reader: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn reader_slot(&self) -> usize {
        let readers = self.conns.len() - 1;
        if readers == 0 {
            return 0;
        }
        1 + self.next_reader.fetch_add(1, Ordering::Relaxed) % readers
    }

    /// Run `f` on a read connection, recording the operation in metrics.
    pub async fn read<T, E, F>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let start = Instant::now();
        let conns = self.conns.clone();
        let slot = self.reader_slot();
        let result = blocking(move || {
            let conn = conns[slot].blocking_lock();
            f(&conn)
        })
        .await;
        record(operation, start, result.is_ok());
        result
    }

    /// Run `f` inside a transaction on the writer. Commits on `Ok`, rolls
    /// back on `Err`.
    pub async fn write<T, E, F>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let start = Instant::now();
        let conns = self.conns.clone();
        let result = blocking(move || {
            let mut conn = conns[0].blocking_lock();
            let tx = conn.transaction().map_err(StoreError::from)?;
            let value = f(&tx)?;
            tx.commit().map_err(StoreError::from)?;
            Ok(value)
        })
        .await;
        record(operation, start, result.is_ok());
        result
    }

    /// Drop failure cooldowns older than the retention window.
    pub async fn purge_expired_failures(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let removed: usize = self
            .write("purge_failures", move |tx| progress::purge_expired_failures(tx, now))
            .await?;
        if removed > 0 {
            debug!(removed, "Purged expired failure cooldowns");
        }
        Ok(removed)
    }
}

fn prepare(conn: Connection) -> StoreResult<Connection> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

async fn blocking<T, E>(f: impl FnOnce() -> Result<T, E> + Send + 'static) -> Result<T, E>
where
    T: Send + 'static,
    E: From<StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(StoreError::from(e).into()),
    }
}

fn record(operation: &str, start: Instant, ok: bool) {
    let status = if ok { "success" } else { "error" };
    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("mentor-store-{}-{}", name, uuid::Uuid::new_v4()))
            .join("mentor.db")
    }

    fn count_solved(conn: &Connection) -> StoreResult<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM solved", [], |row| row.get(0))?)
    }

    #[tokio::test]
    async fn schema_applies_twice() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .write("schema", |tx| -> StoreResult<()> {
                tx.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_write_rolls_back() {
        let store = LocalStore::open_in_memory().unwrap();
        let result: StoreResult<()> = store
            .write("test", |tx| {
                tx.execute(
                    "INSERT INTO solved (identity, fingerprint) VALUES ('a', 'b')",
                    [],
                )?;
                Err(StoreError::Invalid("abort".to_string()))
            })
            .await;
        assert!(result.is_err());

        assert_eq!(store.read("test", count_solved).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_store_reads_through_reader_connections() {
        let path = temp_db("readers");
        let store = LocalStore::open(&path, 2).unwrap();
        assert_eq!(store.conns.len(), 3);

        store
            .write("test", |tx| -> StoreResult<()> {
                tx.execute(
                    "INSERT INTO solved (identity, fingerprint) VALUES ('a', 'b')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        for _ in 0..3 {
            assert_eq!(store.read("test", count_solved).await.unwrap(), 1);
        }

        let readonly: StoreResult<usize> = store
            .read("test", |conn| Ok(conn.execute("DELETE FROM solved", [])?))
            .await;
        assert!(readonly.is_err());

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[tokio::test]
    async fn readers_are_not_blocked_by_a_slow_writer() {
        let path = temp_db("concurrent");
        let store = LocalStore::open(&path, 2).unwrap();

        let writer = store.clone();
        let slow_write = tokio::spawn(async move {
            writer
                .write("slow", |tx| -> StoreResult<Instant> {
                    tx.execute(
                        "INSERT INTO solved (identity, fingerprint) VALUES ('a', 'b')",
                        [],
                    )?;
                    std::thread::sleep(Duration::from_millis(400));
                    Ok(Instant::now())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = store.read("test", count_solved).await.unwrap();
        let read_done = Instant::now();

        let write_done = slow_write.await.unwrap().unwrap();
        assert_eq!(seen, 0, "uncommitted row must not be visible");
        assert!(read_done < write_done, "read waited for the writer");
        assert_eq!(store.read("test", count_solved).await.unwrap(), 1);

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }
}

//! SQLite backend — one row per key in an embedded relational table.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE state (
//!     namespace  TEXT NOT NULL,   -- '' for the root namespace
//!     key        TEXT NOT NULL,
//!     value      TEXT NOT NULL,   -- JSON
//!     updated_at INTEGER NOT NULL,
//!     PRIMARY KEY (namespace, key)
//! );
//! ```
//!
//! Writes are upserts. Read-modify-write runs inside an IMMEDIATE
//! transaction, which also holds SQLite's write lock against other
//! processes sharing the file. The connection is opened in WAL mode.

use crate::error::{StateError, StateResult};
use crate::key::{Namespace, QualifiedKey};
use crate::storage::{StateBackend, now_millis};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS state (
    namespace  TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (namespace, key)
);
";

const UPSERT: &str = "
INSERT INTO state (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Relational storage on an embedded SQLite database.
pub struct SqliteBackend {
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open or create the database at `path`. `":memory:"` opens a private
    /// in-memory database.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(&path, e))?;
        }
        let conn = Connection::open(&path).map_err(|e| unavailable(&path, e))?;
        Self::prepare(&conn).map_err(|e| unavailable(&path, e))?;
        info!("SQLite state backend ready");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path,
        })
    }

    /// Open a private in-memory database (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        Self::open(":memory:")
    }

    fn prepare(conn: &Connection) -> rusqlite::Result<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // in-memory databases answer "memory" here
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<R>(
        &self,
        op: impl FnOnce(&mut Connection) -> StateResult<R>,
    ) -> StateResult<R> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(StateError::ClosedStoreUse)?;
        op(conn)
    }
}

impl StateBackend for SqliteBackend {
    fn read(&self, key: &QualifiedKey) -> StateResult<Option<Value>> {
        self.with_conn(|conn| read_value(conn, key))
    }

    fn write(&self, key: &QualifiedKey, value: &Value) -> StateResult<()> {
        debug!(key = %key, "sqlite write");
        let encoded = serde_json::to_string(value)?;
        self.with_conn(|conn| {
            conn.prepare_cached(UPSERT)?.execute(params![
                key.namespace().as_str(),
                key.local(),
                encoded,
                now_millis() as i64
            ])?;
            Ok(())
        })
    }

    fn remove(&self, key: &QualifiedKey) -> StateResult<bool> {
        self.with_conn(|conn| {
            let deleted = conn
                .prepare_cached("DELETE FROM state WHERE namespace = ?1 AND key = ?2")?
                .execute(params![key.namespace().as_str(), key.local()])?;
            Ok(deleted > 0)
        })
    }

    fn remove_all(&self, namespace: &Namespace) -> StateResult<usize> {
        self.with_conn(|conn| {
            if namespace.is_root() {
                return Ok(conn.execute("DELETE FROM state", [])?);
            }
            // substr instead of LIKE: '%' and '_' are ordinary characters in identifiers
            let prefix = namespace.prefix();
            let deleted = conn.execute(
                "DELETE FROM state WHERE namespace = ?1 OR substr(namespace, 1, ?2) = ?3",
                params![namespace.as_str(), prefix.chars().count() as i64, prefix],
            )?;
            Ok(deleted)
        })
    }

    fn list_keys(&self, namespace: &Namespace) -> StateResult<Vec<QualifiedKey>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT key FROM state WHERE namespace = ?1 ORDER BY key")?;
            let keys = stmt
                .query_map(params![namespace.as_str()], |row| row.get::<_, String>(0))?
                .map(|local| -> StateResult<QualifiedKey> {
                    Ok(QualifiedKey::from_parts(namespace.as_str(), &local?))
                })
                .collect::<StateResult<Vec<_>>>()?;
            Ok(keys)
        })
    }

    fn count(&self, namespace: &Namespace) -> StateResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM state WHERE namespace = ?1",
                params![namespace.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    fn scan(&self, namespace: &Namespace) -> StateResult<Vec<(QualifiedKey, Value)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT key, value FROM state WHERE namespace = ?1 ORDER BY key",
            )?;
            let rows = stmt.query_map(params![namespace.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut entries = Vec::new();
            for row in rows {
                let (local, raw) = row?;
                let key = QualifiedKey::from_parts(namespace.as_str(), &local);
                let value = decode(&key, &raw)?;
                entries.push((key, value));
            }
            Ok(entries)
        })
    }

    fn update(
        &self,
        key: &QualifiedKey,
        transform: &mut dyn FnMut(Option<Value>) -> StateResult<Value>,
    ) -> StateResult<Value> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let next = transform(read_value(&tx, key)?)?;
            tx.prepare_cached(UPSERT)?.execute(params![
                key.namespace().as_str(),
                key.local(),
                serde_json::to_string(&next)?,
                now_millis() as i64
            ])?;
            tx.commit()?;
            Ok(next)
        })
    }

    fn atomic_updates(&self) -> bool {
        true
    }

    fn flush(&self) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;
            Ok(())
        })
    }

    fn close(&self) -> StateResult<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| StateError::from(e))?;
        info!(path = %self.path.display(), "Closed SQLite state backend");
        Ok(())
    }
}

fn read_value(conn: &Connection, key: &QualifiedKey) -> StateResult<Option<Value>> {
    let raw: Option<String> = conn
        .prepare_cached("SELECT value FROM state WHERE namespace = ?1 AND key = ?2")?
        .query_row(params![key.namespace().as_str(), key.local()], |row| {
            row.get(0)
        })
        .optional()?;
    raw.map(|raw| decode(key, &raw)).transpose()
}

fn decode(key: &QualifiedKey, raw: &str) -> StateResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| StateError::CorruptData(format!("row '{key}' is not valid JSON: {e}")))
}

fn unavailable(path: &Path, err: impl std::fmt::Display) -> StateError {
    StateError::BackendUnavailable {
        backend: "sqlite".to_string(),
        reason: format!("{}: {err}", path.display()),
    }
}

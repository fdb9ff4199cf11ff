//! Storage module — interchangeable engines behind one raw key/value contract.
//!
//! All storage engines implement the [`StateBackend`] trait.
//! The state facade depends only on this trait; counters, arrays and
//! namespacing are layered on top and never reimplemented per engine.

pub mod file;
pub mod memory;
pub mod sqlite;
pub mod variant;

use crate::error::StateResult;
use crate::key::{Namespace, QualifiedKey};
use serde_json::Value;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use variant::BackendVariant;

/// Raw storage interface — every engine implements this trait.
///
/// # Contract
///
/// - `write`: Upsert semantics — overwrites an existing key.
/// - `read`: Returns `None` for absent keys, never errors on absence.
/// - `remove`: Returns `true` if the key existed, `false` otherwise.
/// - `remove_all`: Deletes the namespace subtree (its own keys and every
///   nested namespace). For the root namespace that is the whole store.
/// - `list_keys` / `count` / `scan`: Only keys that belong directly to the
///   namespace, sorted ascending. Nested namespaces are not included.
/// - Read-your-writes: a read after a write on the same backend instance
///   observes that write.
pub trait StateBackend: Send + Sync {
    /// Read the value stored under `key`.
    fn read(&self, key: &QualifiedKey) -> StateResult<Option<Value>>;

    /// Insert or replace the value stored under `key`.
    fn write(&self, key: &QualifiedKey, value: &Value) -> StateResult<()>;

    /// Delete `key`.
    fn remove(&self, key: &QualifiedKey) -> StateResult<bool>;

    /// Delete every key under `namespace`, returning how many were removed.
    fn remove_all(&self, namespace: &Namespace) -> StateResult<usize>;

    /// List keys that belong directly to `namespace`.
    fn list_keys(&self, namespace: &Namespace) -> StateResult<Vec<QualifiedKey>>;

    /// Number of keys that belong directly to `namespace`.
    fn count(&self, namespace: &Namespace) -> StateResult<usize> {
        Ok(self.list_keys(namespace)?.len())
    }

    /// Key-value pairs that belong directly to `namespace`.
    ///
    /// Default implementation reads each listed key.
    fn scan(&self, namespace: &Namespace) -> StateResult<Vec<(QualifiedKey, Value)>> {
        let mut entries = Vec::new();
        for key in self.list_keys(namespace)? {
            if let Some(value) = self.read(&key)? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    /// Read-modify-write of a single key.
    ///
    /// Default implementation is a plain read → transform → write. It is only
    /// atomic when the caller serializes updates; engines that can do better
    /// override it and report so through [`StateBackend::atomic_updates`].
    fn update(
        &self,
        key: &QualifiedKey,
        transform: &mut dyn FnMut(Option<Value>) -> StateResult<Value>,
    ) -> StateResult<Value> {
        let next = transform(self.read(key)?)?;
        self.write(key, &next)?;
        Ok(next)
    }

    /// Whether `update` is atomic against concurrent callers on its own.
    fn atomic_updates(&self) -> bool {
        false
    }

    /// Flush any buffered data to durable storage.
    fn flush(&self) -> StateResult<()>;

    /// Flush and release the underlying connection.
    fn close(&self) -> StateResult<()>;
}

/// Milliseconds since the Unix epoch, stamped on persisted records.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

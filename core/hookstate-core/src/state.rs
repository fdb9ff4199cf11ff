//! State facade — namespaced key/value API over any backend.
//!
//! [`StateStore`] owns the backend connection and dereferences to its root
//! [`State`] view. Views are cheap handles (shared store + namespace) that
//! can be cloned and derived freely; only the owning store can close the
//! connection.
//!
//! Counters and arrays are implemented here, once, as read → transform →
//! write sequences over [`StateBackend::update`]. Mutations against the
//! memory and file engines are serialized by a store-wide lock; the SQLite
//! engine runs them in its own transactions instead.

use crate::config::{StateConfig, StorageKind};
use crate::error::{StateError, StateResult, json_kind};
use crate::key::Namespace;
use crate::storage::{BackendVariant, FileBackend, MemoryBackend, SqliteBackend, StateBackend};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

/// How many times [`State::update`] retries after losing a race.
pub const UPDATE_ATTEMPTS: usize = 64;

struct StoreInner {
    backend: BackendVariant,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl StoreInner {
    fn ensure_open(&self) -> StateResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StateError::ClosedStoreUse)
        } else {
            Ok(())
        }
    }

    fn shutdown(&self) -> StateResult<()> {
        let _guard = self.write_lock.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.backend.close()
    }
}

/// Owner of a backend connection.
///
/// # Example
///
/// ```rust
/// use hookstate_core::StateStore;
///
/// # fn main() -> hookstate_core::StateResult<()> {
/// let store = StateStore::open_in_memory();
/// store.set("last_tool", "Bash")?;
/// assert_eq!(store.increment("calls", 1)?, 1);
///
/// let session = store.namespace("session-42")?;
/// session.append("log", "started")?;
/// assert_eq!(session.keys()?, vec!["log".to_string()]);
///
/// store.close()?;
/// # Ok(())
/// # }
/// ```
pub struct StateStore {
    root: State,
}

impl StateStore {
    /// Open the store described by `config`.
    #[instrument(skip(config), fields(storage = %config.storage))]
    pub fn open(config: &StateConfig) -> StateResult<Self> {
        let backend = BackendVariant::open(config)?;
        info!("Opened state store");
        Ok(Self::with_backend(backend))
    }

    /// Volatile store for tests and ephemeral runs.
    pub fn open_in_memory() -> Self {
        Self::with_backend(BackendVariant::Memory(MemoryBackend::new()))
    }

    /// Store backed by one JSON document at `path`.
    pub fn open_file(path: impl AsRef<Path>) -> StateResult<Self> {
        Ok(Self::with_backend(BackendVariant::File(FileBackend::open(
            path,
        )?)))
    }

    /// Store backed by a SQLite database at `path`.
    pub fn open_sqlite(path: impl AsRef<Path>) -> StateResult<Self> {
        Ok(Self::with_backend(BackendVariant::Sqlite(
            SqliteBackend::open(path)?,
        )))
    }

    /// Wrap an already opened backend.
    pub fn with_backend(backend: BackendVariant) -> Self {
        let inner = Arc::new(StoreInner {
            backend,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        });
        Self {
            root: State {
                inner,
                namespace: Namespace::root(),
            },
        }
    }

    /// Cloned root view; shares the owner's connection and fails after the
    /// owner closes.
    pub fn root(&self) -> State {
        self.root.clone()
    }

    /// Flush and release the backend. Every view derived from this store
    /// fails with [`StateError::ClosedStoreUse`] afterwards.
    pub fn close(self) -> StateResult<()> {
        self.root.inner.shutdown()?;
        info!(storage = %self.root.storage_kind(), "Closed state store");
        Ok(())
    }
}

impl Deref for StateStore {
    type Target = State;

    fn deref(&self) -> &State {
        &self.root
    }
}

impl Drop for StateStore {
    fn drop(&mut self) {
        if let Err(err) = self.root.inner.shutdown() {
            warn!(error = %err, "state store was dropped without close and failed to release its backend");
        }
    }
}

/// A namespace view over a shared store.
#[derive(Clone)]
pub struct State {
    inner: Arc<StoreInner>,
    namespace: Namespace,
}

impl State {
    /// Derive a view scoped to `id` below this one. No side effects.
    pub fn namespace(&self, id: &str) -> StateResult<State> {
        Ok(State {
            inner: Arc::clone(&self.inner),
            namespace: self.namespace.child(id)?,
        })
    }

    /// Full path of this view's namespace (empty for root).
    pub fn namespace_path(&self) -> &str {
        self.namespace.as_str()
    }

    /// Engine behind this view.
    pub fn storage_kind(&self) -> StorageKind {
        self.inner.backend.kind()
    }

    /// Value stored under `key`, or `None` when absent.
    ///
    /// A stored value that does not decode into `T` is a
    /// [`StateError::TypeMismatch`].
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StateResult<Option<T>> {
        let qualified = self.namespace.key(key)?;
        self.inner.ensure_open()?;
        self.inner
            .backend
            .read(&qualified)?
            .map(|value| decode(key, value))
            .transpose()
    }

    /// Like [`State::get`], falling back to `default` when absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> StateResult<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StateResult<()> {
        let qualified = self.namespace.key(key)?;
        let value = serde_json::to_value(value)?;
        debug!(key = %qualified, "set");
        self.mutate(|backend| backend.write(&qualified, &value))
    }

    /// Delete `key`. Deleting an absent key is a no-op.
    pub fn delete(&self, key: &str) -> StateResult<()> {
        let qualified = self.namespace.key(key)?;
        let existed = self.mutate(|backend| backend.remove(&qualified))?;
        debug!(key = %qualified, existed, "delete");
        Ok(())
    }

    pub fn has(&self, key: &str) -> StateResult<bool> {
        let qualified = self.namespace.key(key)?;
        self.inner.ensure_open()?;
        Ok(self.inner.backend.read(&qualified)?.is_some())
    }

    /// Remove every key under this namespace, nested namespaces included.
    /// On the root view this empties the whole store.
    pub fn clear(&self) -> StateResult<()> {
        let removed = self.mutate(|backend| backend.remove_all(&self.namespace))?;
        debug!(namespace = %self.namespace, removed, "clear");
        Ok(())
    }

    /// Local keys of this namespace, sorted.
    pub fn keys(&self) -> StateResult<Vec<String>> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .backend
            .list_keys(&self.namespace)?
            .iter()
            .map(|key| key.local().to_string())
            .collect())
    }

    /// Local entries of this namespace, sorted by key.
    pub fn entries(&self) -> StateResult<Vec<(String, Value)>> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .backend
            .scan(&self.namespace)?
            .into_iter()
            .map(|(key, value)| (key.local().to_string(), value))
            .collect())
    }

    /// Number of local keys.
    pub fn size(&self) -> StateResult<usize> {
        self.inner.ensure_open()?;
        self.inner.backend.count(&self.namespace)
    }

    /// Add `by` to the counter at `key` (absent counts as 0) and return the
    /// new value.
    pub fn increment(&self, key: &str, by: i64) -> StateResult<i64> {
        self.adjust(key, by, i64::checked_add)
    }

    /// Subtract `by` from the counter at `key` and return the new value.
    pub fn decrement(&self, key: &str, by: i64) -> StateResult<i64> {
        self.adjust(key, by, i64::checked_sub)
    }

    /// `increment(key, 1)`
    pub fn incr(&self, key: &str) -> StateResult<i64> {
        self.increment(key, 1)
    }

    /// `decrement(key, 1)`
    pub fn decr(&self, key: &str) -> StateResult<i64> {
        self.decrement(key, 1)
    }

    /// Push `item` onto the end of the array at `key`, creating it if absent.
    pub fn append<T: Serialize + ?Sized>(&self, key: &str, item: &T) -> StateResult<()> {
        let item = serde_json::to_value(item)?;
        self.edit_array(key, move |items| items.push(item))
    }

    /// Insert `item` at the front of the array at `key`, creating it if absent.
    pub fn prepend<T: Serialize + ?Sized>(&self, key: &str, item: &T) -> StateResult<()> {
        let item = serde_json::to_value(item)?;
        self.edit_array(key, move |items| items.insert(0, item))
    }

    /// Atomically replace the value at `key` with `f(current)`.
    ///
    /// `f` runs without any store lock held, so it may read or write other
    /// keys through any view of the same store. The result is committed
    /// only if `key` still holds the value `f` saw; otherwise `f` is called
    /// again with the fresh value. After [`UPDATE_ATTEMPTS`] lost races the
    /// update fails with [`StateError::Conflict`] and nothing is written.
    pub fn update<T, F>(&self, key: &str, mut f: F) -> StateResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> T,
    {
        let qualified = self.namespace.key(key)?;
        for attempt in 1..=UPDATE_ATTEMPTS {
            self.inner.ensure_open()?;
            let seen = self.inner.backend.read(&qualified)?;
            let current = seen.clone().map(|value| decode(key, value)).transpose()?;
            let next = serde_json::to_value(f(current))?;

            let committed = self.update_value(key, &mut |actual| {
                if actual == seen {
                    Ok(next.clone())
                } else {
                    Err(StateError::Conflict {
                        key: key.to_string(),
                    })
                }
            });
            match committed {
                Ok(value) => return decode(key, value),
                Err(StateError::Conflict { .. }) => {
                    debug!(key = %qualified, attempt, "update raced, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(StateError::Conflict {
            key: key.to_string(),
        })
    }

    /// Flush buffered state to durable storage.
    pub fn flush(&self) -> StateResult<()> {
        self.inner.ensure_open()?;
        self.inner.backend.flush()
    }

    fn adjust(
        &self,
        key: &str,
        by: i64,
        op: fn(i64, i64) -> Option<i64>,
    ) -> StateResult<i64> {
        let next = self.update_value(key, &mut |current| {
            let base = match current {
                None => 0,
                Some(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or_default(),
                Some(other) => return Err(StateError::type_mismatch(key, "integer", &other)),
            };
            let next = op(base, by).ok_or_else(|| StateError::TypeMismatch {
                key: key.to_string(),
                expected: "integer within i64 range".to_string(),
                actual: "overflow".to_string(),
            })?;
            Ok(Value::from(next))
        })?;
        next.as_i64()
            .ok_or_else(|| StateError::type_mismatch(key, "integer", &next))
    }

    fn edit_array(&self, key: &str, edit: impl FnOnce(&mut Vec<Value>)) -> StateResult<()> {
        let mut edit = Some(edit);
        self.update_value(key, &mut |current| {
            let mut items = match current {
                None => Vec::new(),
                Some(Value::Array(items)) => items,
                Some(other) => return Err(StateError::type_mismatch(key, "array", &other)),
            };
            if let Some(edit) = edit.take() {
                edit(&mut items);
            }
            Ok(Value::Array(items))
        })?;
        Ok(())
    }

    fn update_value(
        &self,
        key: &str,
        transform: &mut dyn FnMut(Option<Value>) -> StateResult<Value>,
    ) -> StateResult<Value> {
        let qualified = self.namespace.key(key)?;
        debug!(key = %qualified, "update");
        self.mutate(|backend| backend.update(&qualified, transform))
    }

    /// Run a mutation, under the store lock unless the engine is atomic on
    /// its own.
    fn mutate<R>(&self, op: impl FnOnce(&BackendVariant) -> StateResult<R>) -> StateResult<R> {
        let inner = &self.inner;
        if inner.backend.atomic_updates() {
            inner.ensure_open()?;
            return op(&inner.backend);
        }
        let _guard = inner.write_lock.lock();
        inner.ensure_open()?;
        op(&inner.backend)
    }

    #[cfg(test)]
    fn qualify(&self, key: &str) -> StateResult<crate::key::QualifiedKey> {
        self.namespace.key(key)
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> StateResult<T> {
    let actual = json_kind(&value);
    serde_json::from_value(value).map_err(|_| StateError::TypeMismatch {
        key: key.to_string(),
        expected: std::any::type_name::<T>().to_string(),
        actual: actual.to_string(),
    })
}

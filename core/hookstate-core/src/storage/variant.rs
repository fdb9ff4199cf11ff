//! Backend variant — the engine chosen at construction time.

use crate::config::{StateConfig, StorageKind};
use crate::error::StateResult;
use crate::key::{Namespace, QualifiedKey};
use crate::storage::{FileBackend, MemoryBackend, SqliteBackend, StateBackend};
use serde_json::Value;

/// One of the three storage engines.
///
/// The facade holds exactly one variant and only ever talks to it through
/// [`StateBackend`].
pub enum BackendVariant {
    Memory(MemoryBackend),
    File(FileBackend),
    Sqlite(SqliteBackend),
}

impl BackendVariant {
    /// Open the engine described by `config`.
    pub fn open(config: &StateConfig) -> StateResult<Self> {
        config.validate()?;
        match config.storage {
            StorageKind::Memory => Ok(Self::Memory(MemoryBackend::new())),
            StorageKind::File => Ok(Self::File(FileBackend::open(config.require_path()?)?)),
            StorageKind::Sqlite => Ok(Self::Sqlite(SqliteBackend::open(
                config.require_path()?,
            )?)),
        }
    }

    /// Which engine this is.
    pub fn kind(&self) -> StorageKind {
        match self {
            Self::Memory(_) => StorageKind::Memory,
            Self::File(_) => StorageKind::File,
            Self::Sqlite(_) => StorageKind::Sqlite,
        }
    }

    fn as_backend(&self) -> &dyn StateBackend {
        match self {
            Self::Memory(backend) => backend,
            Self::File(backend) => backend,
            Self::Sqlite(backend) => backend,
        }
    }
}

impl StateBackend for BackendVariant {
    fn read(&self, key: &QualifiedKey) -> StateResult<Option<Value>> {
        self.as_backend().read(key)
    }

    fn write(&self, key: &QualifiedKey, value: &Value) -> StateResult<()> {
        self.as_backend().write(key, value)
    }

    fn remove(&self, key: &QualifiedKey) -> StateResult<bool> {
        self.as_backend().remove(key)
    }

    fn remove_all(&self, namespace: &Namespace) -> StateResult<usize> {
        self.as_backend().remove_all(namespace)
    }

    fn list_keys(&self, namespace: &Namespace) -> StateResult<Vec<QualifiedKey>> {
        self.as_backend().list_keys(namespace)
    }

    fn count(&self, namespace: &Namespace) -> StateResult<usize> {
        self.as_backend().count(namespace)
    }

    fn scan(&self, namespace: &Namespace) -> StateResult<Vec<(QualifiedKey, Value)>> {
        self.as_backend().scan(namespace)
    }

    fn update(
        &self,
        key: &QualifiedKey,
        transform: &mut dyn FnMut(Option<Value>) -> StateResult<Value>,
    ) -> StateResult<Value> {
        self.as_backend().update(key, transform)
    }

    fn atomic_updates(&self) -> bool {
        self.as_backend().atomic_updates()
    }

    fn flush(&self) -> StateResult<()> {
        self.as_backend().flush()
    }

    fn close(&self) -> StateResult<()> {
        self.as_backend().close()
    }
}

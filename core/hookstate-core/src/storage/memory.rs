//! In-memory backend using BTreeMap
//!
//! Volatile and fastest; the reference engine other backends are checked against.

use crate::error::StateResult;
use crate::key::{Namespace, QualifiedKey};
use crate::storage::StateBackend;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// In-memory backend keyed by flat qualified key.
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBackend for MemoryBackend {
    fn read(&self, key: &QualifiedKey) -> StateResult<Option<Value>> {
        Ok(self.entries.read().get(&key.flat()).cloned())
    }

    fn write(&self, key: &QualifiedKey, value: &Value) -> StateResult<()> {
        self.entries.write().insert(key.flat(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &QualifiedKey) -> StateResult<bool> {
        Ok(self.entries.write().remove(&key.flat()).is_some())
    }

    fn remove_all(&self, namespace: &Namespace) -> StateResult<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|flat, _| !namespace.contains(flat));
        Ok(before - entries.len())
    }

    fn list_keys(&self, namespace: &Namespace) -> StateResult<Vec<QualifiedKey>> {
        let prefix = namespace.prefix();
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.clone()..)
            .take_while(|(flat, _)| flat.starts_with(&prefix))
            .filter_map(|(flat, _)| namespace.local_part(flat))
            .map(|local| QualifiedKey::from_parts(namespace.as_str(), local))
            .collect())
    }

    fn scan(&self, namespace: &Namespace) -> StateResult<Vec<(QualifiedKey, Value)>> {
        let prefix = namespace.prefix();
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.clone()..)
            .take_while(|(flat, _)| flat.starts_with(&prefix))
            .filter_map(|(flat, value)| {
                let local = namespace.local_part(flat)?;
                Some((
                    QualifiedKey::from_parts(namespace.as_str(), local),
                    value.clone(),
                ))
            })
            .collect())
    }

    fn flush(&self) -> StateResult<()> {
        // No-op for in-memory backend
        Ok(())
    }

    fn close(&self) -> StateResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}

//! File backend — the whole key space as one JSON document on disk.
//!
//! On-disk format: a UTF-8 JSON object whose top-level keys are flat
//! qualified keys and whose values are [`FileRecord`]s:
//!
//! ```json
//! {
//!   "counter": { "value": 3, "updated_at": 1760700000000 },
//!   "session-1:log": { "value": ["start"], "updated_at": 1760700000123 }
//! }
//! ```
//!
//! Every mutation loads the document, applies one change and replaces the
//! file through a synced temporary sibling, so a crash never leaves a
//! truncated document behind. Reads are served from a mirror refreshed on
//! every load.
//!
//! # Limitations
//!
//! There is no cross-process locking. Two processes writing the same file
//! can lose each other's updates, and a reader only sees another process's
//! writes after its own next mutation.

use crate::error::{StateError, StateResult};
use crate::key::{Namespace, QualifiedKey};
use crate::storage::{StateBackend, now_millis};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// One stored entry in the JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Stored payload
    pub value: Value,
    /// Last modification time (unix millis)
    #[serde(default)]
    pub updated_at: u64,
}

impl FileRecord {
    fn new(value: Value) -> Self {
        Self {
            value,
            updated_at: now_millis(),
        }
    }
}

type Document = BTreeMap<String, FileRecord>;

/// JSON-document backed storage.
pub struct FileBackend {
    path: PathBuf,
    mirror: RwLock<Document>,
}

impl FileBackend {
    /// Open the document at `path`. A missing file is an empty store.
    ///
    /// Fails with [`StateError::CorruptData`] when the file exists but is not
    /// a valid document.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = non_empty_parent(&path) {
            fs::create_dir_all(parent).map_err(|e| unavailable(&path, e))?;
        }
        let document = load_document(&path)?;
        info!("Opened state file with {} entries", document.len());
        Ok(Self {
            path,
            mirror: RwLock::new(document),
        })
    }

    /// Location of the JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load → apply `op` → rewrite. The file is only rewritten when `op`
    /// reports a change; an `op` error leaves the file untouched but still
    /// refreshes the mirror from what was loaded.
    fn mutate<R>(
        &self,
        op: impl FnOnce(&mut Document) -> StateResult<(R, bool)>,
    ) -> StateResult<R> {
        let mut mirror = self.mirror.write();
        let loaded = load_document(&self.path)?;
        let mut document = loaded.clone();
        match op(&mut document) {
            Ok((result, changed)) => {
                if changed {
                    save_document(&self.path, &document)?;
                }
                *mirror = document;
                Ok(result)
            }
            Err(err) => {
                *mirror = loaded;
                Err(err)
            }
        }
    }
}

impl StateBackend for FileBackend {
    fn read(&self, key: &QualifiedKey) -> StateResult<Option<Value>> {
        Ok(self
            .mirror
            .read()
            .get(&key.flat())
            .map(|record| record.value.clone()))
    }

    fn write(&self, key: &QualifiedKey, value: &Value) -> StateResult<()> {
        let flat = key.flat();
        debug!(key = %flat, "file write");
        self.mutate(|document| {
            document.insert(flat, FileRecord::new(value.clone()));
            Ok(((), true))
        })
    }

    fn remove(&self, key: &QualifiedKey) -> StateResult<bool> {
        let flat = key.flat();
        self.mutate(|document| {
            let existed = document.remove(&flat).is_some();
            Ok((existed, existed))
        })
    }

    fn remove_all(&self, namespace: &Namespace) -> StateResult<usize> {
        self.mutate(|document| {
            let before = document.len();
            document.retain(|flat, _| !namespace.contains(flat));
            let removed = before - document.len();
            Ok((removed, removed > 0))
        })
    }

    fn list_keys(&self, namespace: &Namespace) -> StateResult<Vec<QualifiedKey>> {
        Ok(self
            .mirror
            .read()
            .keys()
            .filter_map(|flat| namespace.local_part(flat))
            .map(|local| QualifiedKey::from_parts(namespace.as_str(), local))
            .collect())
    }

    fn scan(&self, namespace: &Namespace) -> StateResult<Vec<(QualifiedKey, Value)>> {
        Ok(self
            .mirror
            .read()
            .iter()
            .filter_map(|(flat, record)| {
                let local = namespace.local_part(flat)?;
                Some((
                    QualifiedKey::from_parts(namespace.as_str(), local),
                    record.value.clone(),
                ))
            })
            .collect())
    }

    fn update(
        &self,
        key: &QualifiedKey,
        transform: &mut dyn FnMut(Option<Value>) -> StateResult<Value>,
    ) -> StateResult<Value> {
        let flat = key.flat();
        self.mutate(|document| {
            let current = document.get(&flat).map(|record| record.value.clone());
            let next = transform(current)?;
            document.insert(flat, FileRecord::new(next.clone()));
            Ok((next, true))
        })
    }

    fn flush(&self) -> StateResult<()> {
        // Every mutation is already synced before the rename.
        Ok(())
    }

    fn close(&self) -> StateResult<()> {
        self.flush()?;
        self.mirror.write().clear();
        info!(path = %self.path.display(), "Closed state file");
        Ok(())
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn unavailable(path: &Path, err: std::io::Error) -> StateError {
    StateError::BackendUnavailable {
        backend: "file".to_string(),
        reason: format!("{}: {err}", path.display()),
    }
}

fn load_document(path: &Path) -> StateResult<Document> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Document::new()),
        Err(err) => return Err(unavailable(path, err)),
    };
    // A freshly touched file counts as empty.
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::new());
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| StateError::CorruptData(format!("{}: {e}", path.display())))
}

fn save_document(path: &Path, document: &Document) -> StateResult<()> {
    let dir = non_empty_parent(path).unwrap_or_else(|| Path::new("."));
    let bytes = serde_json::to_vec_pretty(document)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StateError::Io { source: e.error })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn key(local: &str) -> QualifiedKey {
        Namespace::root().key(local).unwrap()
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("state.json")).unwrap();
        assert_eq!(backend.read(&key("a")).unwrap(), None);
        assert_eq!(backend.count(&Namespace::root()).unwrap(), 0);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("state.json");
        let backend = FileBackend::open(&path).unwrap();
        backend.write(&key("a"), &json!(1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn records_carry_value_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = FileBackend::open(&path).unwrap();
        let ns = Namespace::root().child("s1").unwrap();
        backend.write(&ns.key("a").unwrap(), &json!({"x": 1})).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["s1:a"]["value"], json!({"x": 1}));
        assert!(raw["s1:a"]["updated_at"].as_u64().unwrap() > 0);
    }

    #[test]
    fn invalid_json_is_corrupt_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileBackend::open(&path).err().unwrap();
        assert!(matches!(err, StateError::CorruptData(_)));
        // user data left as-is
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn records_without_value_are_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"a": {"updated_at": 1}}"#).unwrap();
        assert!(matches!(
            FileBackend::open(&path).err().unwrap(),
            StateError::CorruptData(_)
        ));
    }

    #[test]
    fn blank_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "\n").unwrap();
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.count(&Namespace::root()).unwrap(), 0);
    }

    #[test]
    fn reopen_sees_persisted_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let backend = FileBackend::open(&path).unwrap();
            backend.write(&key("a"), &json!([1, 2])).unwrap();
            backend.close().unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read(&key("a")).unwrap(), Some(json!([1, 2])));
    }

    #[test]
    fn failed_update_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = FileBackend::open(&path).unwrap();
        backend.write(&key("a"), &json!("keep")).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let result = backend.update(&key("a"), &mut |_| Err(StateError::ClosedStoreUse));
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn removing_absent_key_does_not_create_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = FileBackend::open(&path).unwrap();
        assert!(!backend.remove(&key("a")).unwrap());
        assert!(!path.exists());
    }
}

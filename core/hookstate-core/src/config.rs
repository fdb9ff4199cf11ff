//! Construction-time configuration.
//!
//! Mirrors the options hook runners pass when creating a store:
//!
//! ```json
//! { "storage": "sqlite", "path": ".hooks/state.db" }
//! ```
//!
//! `path` is required for `file` and `sqlite` and ignored for `memory`.

use crate::error::{StateError, StateResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable selecting the storage engine.
pub const ENV_STORAGE: &str = "HOOKSTATE_STORAGE";

/// Environment variable holding the storage path.
pub const ENV_PATH: &str = "HOOKSTATE_PATH";

/// Storage engine selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Volatile in-process map
    #[default]
    Memory,
    /// Single JSON document on disk
    File,
    /// Embedded SQLite database
    Sqlite,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::File => "file",
            StorageKind::Sqlite => "sqlite",
        }
    }

    /// Whether this engine needs a `path`.
    pub fn requires_path(&self) -> bool {
        !matches!(self, StorageKind::Memory)
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = StateError;

    fn from_str(s: &str) -> StateResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "file" => Ok(StorageKind::File),
            "sqlite" => Ok(StorageKind::Sqlite),
            other => Err(StateError::Config(format!(
                "unknown storage '{other}' (expected memory, file or sqlite)"
            ))),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StateConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageKind::File,
            path: Some(path.into()),
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageKind::Sqlite,
            path: Some(path.into()),
        }
    }

    /// Parse and validate a JSON options object.
    pub fn from_json(json: &str) -> StateResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| StateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `HOOKSTATE_STORAGE` / `HOOKSTATE_PATH`. Defaults to memory.
    pub fn from_env() -> StateResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StateConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StateResult<Self> {
        let storage = match lookup(ENV_STORAGE) {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => StorageKind::default(),
        };
        let path = lookup(ENV_PATH)
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);
        let config = Self { storage, path };
        config.validate()?;
        Ok(config)
    }

    /// Check that a path is present where the engine needs one.
    pub fn validate(&self) -> StateResult<()> {
        if self.storage.requires_path() && self.path.is_none() {
            return Err(StateError::Config(format!(
                "storage '{}' requires a path",
                self.storage
            )));
        }
        Ok(())
    }

    pub(crate) fn require_path(&self) -> StateResult<&Path> {
        self.path.as_deref().ok_or_else(|| {
            StateError::Config(format!("storage '{}' requires a path", self.storage))
        })
    }
}

//! Error types for the hookstate store.
//!
//! All public APIs return `StateResult<T>` — no panics in library code.

use thiserror::Error;

/// Unified error type for all store operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// The file or database behind a backend could not be opened or reached
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Persisted contents are not valid JSON, or a row value cannot be decoded
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// Existing value has the wrong shape for the requested operation
    #[error("type mismatch on '{key}': expected {expected}, got {actual}")]
    TypeMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// A typed update kept losing races against other writers
    #[error("update conflict on '{key}': value kept changing")]
    Conflict { key: String },

    /// Any operation issued after the owning store was closed
    #[error("state store is closed")]
    ClosedStoreUse,

    /// Key or namespace identifier is empty or contains the reserved separator
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Construction-time configuration error
    #[error("config error: {0}")]
    Config(String),

    /// A value could not be serialized to JSON
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// SQLite engine error
    #[error("sqlite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },
}

/// Result type alias for all store operations.
pub type StateResult<T> = Result<T, StateError>;

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

impl StateError {
    pub(crate) fn type_mismatch(key: &str, expected: &str, actual: &serde_json::Value) -> Self {
        StateError::TypeMismatch {
            key: key.to_string(),
            expected: expected.to_string(),
            actual: json_kind(actual).to_string(),
        }
    }
}

/// Short name of a JSON value's shape, used in mismatch messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        serde_json::Value::Number(_) => "float",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

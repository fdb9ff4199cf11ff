//! # hookstate — persistent state for event hooks
//!
//! Handlers fired by lifecycle events (tool calls, session start/stop, ...)
//! run as short-lived invocations but need to remember counters, logs and
//! arbitrary JSON values between runs. hookstate is a small key/value store
//! for that, with one API over three interchangeable engines:
//!
//! | engine | durability | atomic read-modify-write |
//! |---|---|---|
//! | memory | none | store lock |
//! | file (one JSON document) | on every mutation | store lock, single process only |
//! | sqlite | on every mutation | SQLite transaction |
//!
//! ## Quick start
//!
//! ```rust
//! use hookstate_core::{StateConfig, StateStore};
//! use serde_json::json;
//!
//! # fn main() -> hookstate_core::StateResult<()> {
//! let dir = tempfile::tempdir()?;
//! let store = StateStore::open(&StateConfig::sqlite(dir.path().join("state.db")))?;
//!
//! store.incr("counter")?;
//! store.incr("counter")?;
//! assert_eq!(store.get::<i64>("counter")?, Some(2));
//!
//! // namespaces are views over the same connection
//! let session = store.namespace("session-7")?;
//! session.set("cwd", "/work")?;
//! session.append("events", &json!({"tool": "Bash"}))?;
//! assert_eq!(session.keys()?, vec!["cwd".to_string(), "events".to_string()]);
//! assert!(!store.has("cwd")?);
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module structure
//!
//! - [`state`] — the facade ([`StateStore`], [`State`])
//! - [`storage`] — [`StateBackend`](storage::StateBackend) and the engines
//! - [`key`] — namespaces, qualified keys, the reserved separator
//! - [`config`] — construction options
//! - [`error`] — [`StateError`]

pub mod config;
pub mod error;
pub mod key;
pub mod state;
pub mod storage;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use config::{StateConfig, StorageKind};
pub use error::{StateError, StateResult};
pub use key::{Namespace, QualifiedKey, SEPARATOR};
pub use state::{State, StateStore, UPDATE_ATTEMPTS};

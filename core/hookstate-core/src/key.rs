//! Key model — namespaces and qualified keys.
//!
//! A qualified key is `namespace + SEPARATOR + key` for non-root namespaces
//! and the bare key for the root. The separator is rejected inside both
//! local keys and namespace identifiers, so a flat qualified key always
//! splits back into exactly one `(namespace, key)` pair.

use crate::error::{StateError, StateResult};
use std::fmt;

/// Reserved character joining namespace segments and the local key.
pub const SEPARATOR: char = ':';

/// A prefix-qualified partition of the key space.
///
/// The root namespace has an empty path. Nested namespaces are stored as
/// their full path, e.g. `session-42:tools`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(String);

impl Namespace {
    /// The root namespace.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Returns `true` for the root namespace.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Full namespace path (empty for root).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a nested namespace. `id` must be non-empty and separator-free.
    pub fn child(&self, id: &str) -> StateResult<Namespace> {
        validate_segment(id, "namespace")?;
        if self.is_root() {
            Ok(Self(id.to_string()))
        } else {
            Ok(Self(format!("{}{SEPARATOR}{id}", self.0)))
        }
    }

    /// Qualify a local key in this namespace.
    pub fn key(&self, local: &str) -> StateResult<QualifiedKey> {
        validate_segment(local, "key")?;
        Ok(QualifiedKey {
            namespace: self.clone(),
            local: local.to_string(),
        })
    }

    /// Rebuild a namespace from a stored path without re-validating it.
    pub(crate) fn from_path(path: &str) -> Self {
        Self(path.to_string())
    }

    /// Flat-key prefix of everything in this namespace's subtree.
    pub fn prefix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("{}{SEPARATOR}", self.0)
        }
    }

    /// Returns the local part of `flat` when it belongs directly to this
    /// namespace. Keys of nested namespaces yield `None`.
    pub fn local_part<'a>(&self, flat: &'a str) -> Option<&'a str> {
        let rest = if self.is_root() {
            flat
        } else {
            flat.strip_prefix(self.0.as_str())?
                .strip_prefix(SEPARATOR)?
        };
        (!rest.contains(SEPARATOR)).then_some(rest)
    }

    /// Returns `true` when `flat` falls under this namespace's subtree.
    pub fn contains(&self, flat: &str) -> bool {
        self.is_root() || flat.starts_with(&self.prefix())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// The fully prefixed key a backend actually stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedKey {
    namespace: Namespace,
    local: String,
}

impl QualifiedKey {
    /// Namespace part.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Local (unqualified) key.
    pub fn local(&self) -> &str {
        &self.local
    }

    /// Flat string form used by the memory and file backends.
    pub fn flat(&self) -> String {
        if self.namespace.is_root() {
            self.local.clone()
        } else {
            format!("{}{SEPARATOR}{}", self.namespace.0, self.local)
        }
    }

    /// Split a flat key at its last separator.
    pub fn from_flat(flat: &str) -> Self {
        match flat.rsplit_once(SEPARATOR) {
            Some((ns, local)) => Self {
                namespace: Namespace::from_path(ns),
                local: local.to_string(),
            },
            None => Self {
                namespace: Namespace::root(),
                local: flat.to_string(),
            },
        }
    }

    pub(crate) fn from_parts(namespace: &str, local: &str) -> Self {
        Self {
            namespace: Namespace::from_path(namespace),
            local: local.to_string(),
        }
    }
}

impl fmt::Display for QualifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flat())
    }
}

fn validate_segment(segment: &str, what: &str) -> StateResult<()> {
    if segment.is_empty() {
        return Err(StateError::InvalidKey {
            key: segment.to_string(),
            reason: format!("{what} must not be empty"),
        });
    }
    if segment.contains(SEPARATOR) {
        return Err(StateError::InvalidKey {
            key: segment.to_string(),
            reason: format!("{what} must not contain reserved separator '{SEPARATOR}'"),
        });
    }
    Ok(())
}

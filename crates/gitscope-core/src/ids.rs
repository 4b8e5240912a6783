//! Branded identifier newtypes.
//!
//! Document identity is redundant on purpose: the host hands us an opaque
//! buffer id, and we additionally key every document by a normalized path
//! string so lookups by either form resolve to the same record.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host buffer identity. Opaque, assigned by the host editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// Normalized path key for a document.
///
/// Case-folded, separator-normalized, scheme-stripped. Two URIs that refer
/// to the same file on a case-insensitive filesystem produce the same key.
/// Construct only via [`DocumentKey::normalize`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Normalize a URI or path into a key.
    ///
    /// Strips a `file://` scheme prefix, converts backslashes to forward
    /// slashes, lowercases, and drops a trailing slash.
    pub fn normalize(raw: &str) -> Self {
        let mut s = raw.strip_prefix("file://").unwrap_or(raw).replace('\\', "/");
        s.make_ascii_lowercase();
        while s.len() > 1 && s.ends_with('/') {
            let _ = s.pop();
        }
        Self(s)
    }

    /// The normalized key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-owning handle into the external repository registry.
///
/// An opaque identifier (normalized repository root), never a reference:
/// the registry's lifetime and the document's are independent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Create a repository id from its registry key (normalized root path).
    pub fn new(root: impl Into<String>) -> Self {
        Self(root.into())
    }

    /// The registry key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A host document reference: buffer id plus the URI it was opened with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    /// Host buffer identity.
    pub id: DocumentId,
    /// URI as delivered by the host (un-normalized).
    pub uri: String,
}

impl DocumentHandle {
    /// Create a handle.
    pub fn new(id: u64, uri: impl Into<String>) -> Self {
        Self {
            id: DocumentId(id),
            uri: uri.into(),
        }
    }

    /// Derive the normalized lookup key for this document.
    #[must_use]
    pub fn key(&self) -> DocumentKey {
        DocumentKey::normalize(&self.uri)
    }
}

//! Error types for the git collaborator seam.

use thiserror::Error;

/// Errors surfaced by [`crate::git::GitProvider`] queries.
///
/// None of these are fatal to the host: call sites absorb them and derive
/// fail-closed state (`tracked = false`, `has_remote = false`), optionally
/// with a diagnostic log entry.
#[derive(Debug, Error)]
pub enum GitError {
    /// A repository query failed.
    #[error("Repository query '{query}' failed: {message}")]
    Query {
        /// Which query failed (e.g. `is_tracked`).
        query: &'static str,
        /// Error detail from the collaborator.
        message: String,
    },

    /// The URI could not be parsed into a location.
    #[error("Unresolvable document uri: {0}")]
    UnresolvableUri(String),

    /// The git collaborator is not available.
    #[error("Git provider unavailable")]
    Unavailable,
}

impl GitError {
    /// Convenience constructor for query failures.
    pub fn query(query: &'static str, message: impl Into<String>) -> Self {
        Self::Query {
            query,
            message: message.into(),
        }
    }
}

//! The git-repository collaborator seam.
//!
//! GitScope never computes diffs or blame itself. Everything it needs from
//! version control flows through [`GitProvider`]: a handful of async
//! queries plus a broadcast stream of repository-change notifications.
//! Query failures are absorbed fail-closed at the call sites (a document
//! whose provider errors is simply untracked with no remote).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::GitError;
use crate::ids::RepositoryId;

/// A resolved document location.
///
/// The revision pin distinguishes a historical snapshot (e.g. a file opened
/// from a diff view at a specific commit) from the live working copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLocation {
    /// Repository-relative or absolute file path.
    pub path: String,
    /// Revision pin, if this location names a historical commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl DocumentLocation {
    /// Location in the working copy.
    pub fn working(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: None,
        }
    }

    /// Location pinned to a specific revision.
    pub fn at_revision(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: Some(revision.into()),
        }
    }

    /// Whether this location pins a historical revision.
    #[must_use]
    pub fn is_revision(&self) -> bool {
        self.revision.is_some()
    }
}

/// What changed in a repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryChangeKind {
    /// Index contents changed (stage/unstage, commit).
    Index,
    /// A ref moved (checkout, branch update). Not structural.
    Heads,
    /// Remote set changed.
    Remotes,
    /// Repository configuration changed.
    Config,
    /// Repository was closed/removed from the registry.
    Closed,
    /// Unclassified change.
    Unknown,
}

impl RepositoryChangeKind {
    /// Whether this change invalidates a document's cached tracked/remote
    /// state. A mere ref update does not.
    #[must_use]
    pub fn is_structural(self) -> bool {
        !matches!(self, Self::Heads)
    }
}

/// A repository-change notification from the external registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryChange {
    /// Which repository changed.
    pub repository: RepositoryId,
    /// What kind of change occurred.
    pub kind: RepositoryChangeKind,
}

/// Async queries against the external git collaborator.
///
/// Continuations are not guaranteed to complete in issue order; callers
/// guard application of results with generation counters.
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// Parse a host URI into a location, extracting any revision pin.
    async fn resolve_location(&self, uri: &str) -> Result<DocumentLocation, GitError>;

    /// The repository containing this location, if any.
    async fn get_repository(
        &self,
        location: &DocumentLocation,
    ) -> Result<Option<RepositoryId>, GitError>;

    /// Whether the location's path is known to version control.
    async fn is_tracked(&self, location: &DocumentLocation) -> Result<bool, GitError>;

    /// Whether the repository has at least one remote configured.
    async fn repository_has_remote(&self, repository: &RepositoryId) -> Result<bool, GitError>;

    /// All repositories currently known to the registry.
    async fn list_repositories(&self) -> Result<Vec<RepositoryId>, GitError>;

    /// Subscribe to repository-change notifications.
    ///
    /// Dropping the receiver cancels the subscription.
    fn subscribe_changes(&self) -> broadcast::Receiver<RepositoryChange>;
}

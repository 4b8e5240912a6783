//! Shared test utilities for the tracker.
//!
//! Provides `FakeGitProvider` and `RecordingContextSink` — in-memory fakes
//! for the two injected seams, so state-machine tests need no real
//! repository or host.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};

use gitscope_core::context::{ContextFlag, HostContextSink};
use gitscope_core::errors::GitError;
use gitscope_core::git::{DocumentLocation, GitProvider, RepositoryChange, RepositoryChangeKind};
use gitscope_core::ids::RepositoryId;

/// In-memory git collaborator.
///
/// Supports builder setup (`with_*`), live mutation mid-test (`set_*`),
/// blanket query failure, and a per-call gate on `is_tracked` so tests can
/// interleave a reset between issuing and completing a query. The gate
/// captures each call's answer at entry: releasing calls out of order
/// exercises out-of-order continuation completion deterministically.
pub struct FakeGitProvider {
    state: Mutex<FakeGitState>,
    changes: broadcast::Sender<RepositoryChange>,
    query_count: AtomicU64,
}

struct FakeGitState {
    /// Known repositories and whether each has a remote.
    repositories: HashMap<RepositoryId, bool>,
    /// Paths known to version control.
    tracked: HashSet<String>,
    /// Path -> owning repository.
    repo_of: HashMap<String, RepositoryId>,
    /// URI -> revision pin.
    revisions: HashMap<String, String>,
    /// When true, every query errors (fail-closed path).
    fail_queries: bool,
    /// When set, `is_tracked` calls park here until released.
    gate: Option<Vec<oneshot::Sender<()>>>,
    /// When set, `list_repositories` calls park here until released.
    list_gate: Option<Vec<oneshot::Sender<()>>>,
}

impl FakeGitProvider {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(FakeGitState {
                repositories: HashMap::new(),
                tracked: HashSet::new(),
                repo_of: HashMap::new(),
                revisions: HashMap::new(),
                fail_queries: false,
                gate: None,
                list_gate: None,
            }),
            changes,
            query_count: AtomicU64::new(0),
        })
    }

    /// Builder: register a repository.
    pub fn with_repository(self: Arc<Self>, root: &str, has_remote: bool) -> Arc<Self> {
        let _ = self
            .state
            .lock()
            .repositories
            .insert(RepositoryId::new(root), has_remote);
        self
    }

    /// Builder: mark a path tracked inside a repository.
    pub fn with_tracked(self: Arc<Self>, path: &str, repo_root: &str) -> Arc<Self> {
        let mut s = self.state.lock();
        let _ = s.tracked.insert(path.to_string());
        let _ = s
            .repo_of
            .insert(path.to_string(), RepositoryId::new(repo_root));
        drop(s);
        self
    }

    /// Builder: associate an untracked path with a repository.
    pub fn with_untracked(self: Arc<Self>, path: &str, repo_root: &str) -> Arc<Self> {
        let _ = self
            .state
            .lock()
            .repo_of
            .insert(path.to_string(), RepositoryId::new(repo_root));
        self
    }

    /// Builder: pin a URI to a revision.
    pub fn with_revision(self: Arc<Self>, uri: &str, revision: &str) -> Arc<Self> {
        let _ = self
            .state
            .lock()
            .revisions
            .insert(uri.to_string(), revision.to_string());
        self
    }

    /// Flip a path's tracked status mid-test.
    pub fn set_tracked(&self, path: &str, tracked: bool) {
        let mut s = self.state.lock();
        if tracked {
            let _ = s.tracked.insert(path.to_string());
        } else {
            let _ = s.tracked.remove(path);
        }
    }

    /// Flip a repository's remote status mid-test.
    pub fn set_has_remote(&self, root: &str, has_remote: bool) {
        let _ = self
            .state
            .lock()
            .repositories
            .insert(RepositoryId::new(root), has_remote);
    }

    /// Make every subsequent query fail.
    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().fail_queries = fail;
    }

    /// Start gating `is_tracked` calls.
    pub fn hold_tracked_queries(&self) {
        self.state.lock().gate = Some(Vec::new());
    }

    /// Number of `is_tracked` calls currently parked at the gate.
    pub fn parked_tracked_queries(&self) -> usize {
        self.state.lock().gate.as_ref().map_or(0, Vec::len)
    }

    /// Release the parked call at `index` (in arrival order).
    pub fn release_tracked_query(&self, index: usize) {
        let tx = {
            let mut s = self.state.lock();
            s.gate
                .as_mut()
                .expect("gate not held")
                .remove(index)
        };
        let _ = tx.send(());
    }

    /// Stop gating and release everything still parked.
    pub fn release_all_tracked_queries(&self) {
        let parked = self.state.lock().gate.take().unwrap_or_default();
        for tx in parked {
            let _ = tx.send(());
        }
    }

    /// Start gating `list_repositories` calls.
    pub fn hold_repository_lists(&self) {
        self.state.lock().list_gate = Some(Vec::new());
    }

    /// Number of `list_repositories` calls currently parked at the gate.
    pub fn parked_repository_lists(&self) -> usize {
        self.state.lock().list_gate.as_ref().map_or(0, Vec::len)
    }

    /// Stop gating `list_repositories` and release everything parked.
    pub fn release_all_repository_lists(&self) {
        let parked = self.state.lock().list_gate.take().unwrap_or_default();
        for tx in parked {
            let _ = tx.send(());
        }
    }

    /// Total queries served (all kinds).
    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Push a repository-change notification to subscribers.
    pub fn emit_change(&self, root: &str, kind: RepositoryChangeKind) {
        let _ = self.changes.send(RepositoryChange {
            repository: RepositoryId::new(root),
            kind,
        });
    }

    fn count_query(&self) -> Result<(), GitError> {
        let _ = self.query_count.fetch_add(1, Ordering::Relaxed);
        if self.state.lock().fail_queries {
            Err(GitError::query("fake", "configured to fail"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GitProvider for FakeGitProvider {
    async fn resolve_location(&self, uri: &str) -> Result<DocumentLocation, GitError> {
        self.count_query()?;
        let s = self.state.lock();
        let path = uri.strip_prefix("file://").unwrap_or(uri).to_string();
        Ok(DocumentLocation {
            path,
            revision: s.revisions.get(uri).cloned(),
        })
    }

    async fn get_repository(
        &self,
        location: &DocumentLocation,
    ) -> Result<Option<RepositoryId>, GitError> {
        self.count_query()?;
        Ok(self.state.lock().repo_of.get(&location.path).cloned())
    }

    async fn is_tracked(&self, location: &DocumentLocation) -> Result<bool, GitError> {
        self.count_query()?;
        // Capture the answer at entry, then park if the gate is held.
        let (answer, parked) = {
            let mut s = self.state.lock();
            let answer = s.tracked.contains(&location.path);
            let parked = s.gate.as_mut().map(|waiters| {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                rx
            });
            (answer, parked)
        };
        if let Some(rx) = parked {
            let _ = rx.await;
        }
        Ok(answer)
    }

    async fn repository_has_remote(&self, repository: &RepositoryId) -> Result<bool, GitError> {
        self.count_query()?;
        Ok(self
            .state
            .lock()
            .repositories
            .get(repository)
            .copied()
            .unwrap_or(false))
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryId>, GitError> {
        self.count_query()?;
        let (repos, parked) = {
            let mut s = self.state.lock();
            let repos = s.repositories.keys().cloned().collect();
            let parked = s.list_gate.as_mut().map(|waiters| {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                rx
            });
            (repos, parked)
        };
        if let Some(rx) = parked {
            let _ = rx.await;
        }
        Ok(repos)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<RepositoryChange> {
        self.changes.subscribe()
    }
}

/// Records every flag set for post-run assertions.
#[derive(Default)]
pub struct RecordingContextSink {
    sets: Mutex<Vec<(ContextFlag, bool)>>,
}

impl RecordingContextSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All `(flag, value)` sets in order.
    pub fn sets(&self) -> Vec<(ContextFlag, bool)> {
        self.sets.lock().clone()
    }

    /// The most recent value set for a flag, if any.
    pub fn last(&self, flag: ContextFlag) -> Option<bool> {
        self.sets
            .lock()
            .iter()
            .rev()
            .find(|(f, _)| *f == flag)
            .map(|(_, v)| *v)
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.sets.lock().clear();
    }
}

impl HostContextSink for RecordingContextSink {
    fn set_flag(&self, flag: ContextFlag, value: bool) {
        self.sets.lock().push((flag, value));
    }
}

//! Per-document state machine.
//!
//! Each open document owns exactly one `TrackedDocument` holding its
//! derived version-control flags. Derivation is asynchronous: the document
//! issues repository queries, and every continuation re-checks disposal and
//! its captured generation before applying results, so a reset or disposal
//! that interleaves with an in-flight query wins unconditionally.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use gitscope_core::git::{GitProvider, RepositoryChange};
use gitscope_core::ids::{DocumentHandle, DocumentKey, RepositoryId};

use crate::active::ActiveContext;

/// Lifecycle of a tracked document. `Disposed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, derivation not yet started.
    Uninitialized,
    /// First derivation in flight.
    Initializing,
    /// Derived flags are current (modulo in-flight refresh).
    Ready,
    /// Closed. No further continuation may mutate state.
    Disposed,
}

/// Why a document's cached state was cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetReason {
    /// The owning repository changed structurally.
    RepositoryChanged,
    /// A tracker-sensitive configuration key changed.
    ConfigurationChanged,
    /// The document is being disposed.
    Dispose,
}

impl ResetReason {
    /// Stable string for log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RepositoryChanged => "repository_changed",
            Self::ConfigurationChanged => "configuration_changed",
            Self::Dispose => "dispose",
        }
    }
}

/// Snapshot of a document's externally visible flags.
///
/// `blameable` is computed in the one constructor, never stored: it is a
/// pure function of `tracked` and the blame-failure flag at all times.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentFlags {
    /// Path is known to version control.
    pub tracked: bool,
    /// Tracked with no recorded blame failure.
    pub blameable: bool,
    /// Location pins a historical revision.
    pub is_revision: bool,
    /// Owning repository has a remote.
    pub has_remote: bool,
    /// Buffer has unsaved edits.
    pub dirty: bool,
}

impl DocumentFlags {
    fn of(state: &DocState) -> Self {
        Self {
            tracked: state.tracked,
            blameable: state.tracked && !state.blame_failed,
            is_revision: state.is_revision,
            has_remote: state.has_remote,
            dirty: state.dirty,
        }
    }
}

struct DocState {
    lifecycle: Lifecycle,
    /// Bumped on every reset; in-flight continuations that captured an
    /// older value discard their result.
    generation: u64,
    dirty: bool,
    tracked: bool,
    is_revision: bool,
    has_remote: bool,
    blame_failed: bool,
    /// One-shot: suppress the next dirty-flip reaction (a collaborator is
    /// about to cause an edit it already knows about).
    trigger_on_next_change: bool,
    repository: Option<RepositoryId>,
}

/// Authoritative per-document state record.
pub struct TrackedDocument {
    handle: DocumentHandle,
    key: DocumentKey,
    git: Arc<dyn GitProvider>,
    context: Arc<ActiveContext>,
    state: Mutex<DocState>,
}

impl TrackedDocument {
    /// Create an uninitialized document record.
    pub fn new(
        handle: DocumentHandle,
        git: Arc<dyn GitProvider>,
        context: Arc<ActiveContext>,
    ) -> Arc<Self> {
        let key = handle.key();
        Arc::new(Self {
            handle,
            key,
            git,
            context,
            state: Mutex::new(DocState {
                lifecycle: Lifecycle::Uninitialized,
                generation: 0,
                dirty: false,
                tracked: false,
                is_revision: false,
                has_remote: false,
                blame_failed: false,
                trigger_on_next_change: false,
                repository: None,
            }),
        })
    }

    /// The host handle this record was created for.
    pub fn handle(&self) -> &DocumentHandle {
        &self.handle
    }

    /// Normalized lookup key.
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Begin async derivation of repository association and flags.
    ///
    /// The first completed derivation publishes unconditionally (the prior
    /// published value is undefined).
    pub async fn initialize(&self) {
        let generation = {
            let mut s = self.state.lock();
            match s.lifecycle {
                Lifecycle::Disposed => return,
                Lifecycle::Uninitialized => s.lifecycle = Lifecycle::Initializing,
                Lifecycle::Initializing | Lifecycle::Ready => {}
            }
            s.generation
        };
        self.derive(generation).await;
    }

    /// Clear cached state, bump the generation, and re-derive.
    pub async fn reset(&self, reason: ResetReason) {
        let generation = {
            let mut s = self.state.lock();
            if s.lifecycle == Lifecycle::Disposed {
                return;
            }
            clear_cached(&mut s)
        };
        debug!(document = %self.key, reason = reason.as_str(), "reset");
        self.derive(generation).await;
    }

    /// React to a change in the owning repository.
    ///
    /// Structural changes invalidate cached state; a mere ref update does
    /// not.
    pub async fn on_repository_changed(&self, change: &RepositoryChange) {
        if !change.kind.is_structural() {
            return;
        }
        {
            let s = self.state.lock();
            if s.lifecycle == Lifecycle::Disposed
                || s.repository.as_ref() != Some(&change.repository)
            {
                return;
            }
        }
        self.reset(ResetReason::RepositoryChanged).await;
    }

    /// Record a blame-computation failure reported by a collaborator.
    ///
    /// Downgrades `blameable` without touching `tracked`; the publish is
    /// forced because the raw tracked flag did not change.
    pub async fn set_blame_failure(&self) {
        let flags = {
            let mut s = self.state.lock();
            if s.lifecycle == Lifecycle::Disposed || s.blame_failed {
                return;
            }
            s.blame_failed = true;
            DocumentFlags::of(&s)
        };
        self.context.publish(&self.key, flags, true).await;
    }

    /// Clear a recorded blame failure (an edit invalidates it).
    pub async fn clear_blame_failure(&self) {
        let flags = {
            let mut s = self.state.lock();
            if s.lifecycle == Lifecycle::Disposed || !s.blame_failed {
                return;
            }
            s.blame_failed = false;
            DocumentFlags::of(&s)
        };
        self.context.publish(&self.key, flags, false).await;
    }

    /// Terminal disposal. Idempotent; drops all in-flight continuations
    /// via the generation bump.
    pub fn dispose(&self) {
        {
            let mut s = self.state.lock();
            if s.lifecycle == Lifecycle::Disposed {
                return;
            }
            let _ = clear_cached(&mut s);
            s.trigger_on_next_change = false;
            s.lifecycle = Lifecycle::Disposed;
        }
        debug!(document = %self.key, reason = ResetReason::Dispose.as_str(), "disposed");
    }

    /// Update the dirty flag. Returns whether the value actually changed.
    pub fn set_dirty(&self, dirty: bool) -> bool {
        let mut s = self.state.lock();
        if s.lifecycle == Lifecycle::Disposed || s.dirty == dirty {
            return false;
        }
        s.dirty = dirty;
        true
    }

    /// Arm the one-shot expected-change flag.
    pub fn set_trigger_on_next_change(&self) {
        self.state.lock().trigger_on_next_change = true;
    }

    /// Disarm the one-shot expected-change flag.
    pub fn reset_trigger_on_next_change(&self) {
        self.state.lock().trigger_on_next_change = false;
    }

    /// Whether the expected-change flag is armed.
    pub fn should_trigger_on_next_change(&self) -> bool {
        self.state.lock().trigger_on_next_change
    }

    /// Consume the one-shot flag: returns whether it was armed, clearing it.
    pub fn consume_trigger_on_next_change(&self) -> bool {
        let mut s = self.state.lock();
        std::mem::take(&mut s.trigger_on_next_change)
    }

    /// Tracked with no recorded blame failure.
    pub fn is_blameable(&self) -> bool {
        let s = self.state.lock();
        s.tracked && !s.blame_failed
    }

    /// Location pins a historical revision.
    pub fn is_revision(&self) -> bool {
        self.state.lock().is_revision
    }

    /// Path is known to version control.
    pub fn is_tracked(&self) -> bool {
        self.state.lock().tracked
    }

    /// Owning repository has a remote.
    pub fn has_remote(&self) -> bool {
        self.state.lock().has_remote
    }

    /// Buffer has unsaved edits.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Whether disposal has happened.
    pub fn is_disposed(&self) -> bool {
        self.state.lock().lifecycle == Lifecycle::Disposed
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().lifecycle
    }

    /// Current generation (bumped on every reset).
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Owning repository, if the document resolved into one.
    pub fn repository(&self) -> Option<RepositoryId> {
        self.state.lock().repository.clone()
    }

    /// Snapshot of the externally visible flags.
    pub fn flags(&self) -> DocumentFlags {
        DocumentFlags::of(&self.state.lock())
    }

    /// Query the provider and apply the result if still current.
    ///
    /// Query failures are absorbed fail-closed; errors never reach the
    /// event router.
    async fn derive(&self, generation: u64) {
        let location = match self.git.resolve_location(&self.handle.uri).await {
            Ok(loc) => Some(loc),
            Err(e) => {
                warn!(document = %self.key, error = %e, "resolve_location failed");
                None
            }
        };

        let (is_revision, repository, tracked) = match &location {
            Some(loc) => {
                let repository = match self.git.get_repository(loc).await {
                    Ok(repo) => repo,
                    Err(e) => {
                        warn!(document = %self.key, error = %e, "get_repository failed");
                        None
                    }
                };
                let tracked = match self.git.is_tracked(loc).await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(document = %self.key, error = %e, "is_tracked failed");
                        false
                    }
                };
                (loc.is_revision(), repository, tracked)
            }
            None => (false, None, false),
        };

        let has_remote = match &repository {
            Some(repo) => match self.git.repository_has_remote(repo).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(document = %self.key, error = %e, "repository_has_remote failed");
                    false
                }
            },
            None => false,
        };

        let flags = {
            let mut s = self.state.lock();
            if s.lifecycle == Lifecycle::Disposed || s.generation != generation {
                trace!(document = %self.key, generation, "discarding stale derivation");
                return;
            }
            s.is_revision = is_revision;
            s.repository = repository;
            s.tracked = tracked;
            s.has_remote = has_remote;
            s.lifecycle = Lifecycle::Ready;
            DocumentFlags::of(&s)
        };

        self.context.publish(&self.key, flags, false).await;
    }
}

/// Clear cached derivation state and bump the generation. Returns the new
/// generation. The dirty flag is host truth, not cache, and survives.
fn clear_cached(s: &mut DocState) -> u64 {
    s.generation += 1;
    s.tracked = false;
    s.is_revision = false;
    s.has_remote = false;
    s.blame_failed = false;
    s.repository = None;
    s.generation
}

//! Document store and host event routes.
//!
//! `DocumentTracker` owns every [`TrackedDocument`] under a dual index:
//! by host document id and by normalized key. The indexes agree at all
//! times because both live under one lock and every mutation updates
//! them together, so one host document never gets two records.
//!
//! Host editor events enter through the `on_*` routes; repository change
//! notifications arrive through a spawned listener task that routes each
//! change to the documents owned by that repository.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use gitscope_core::context::HostContextSink;
use gitscope_core::git::{GitProvider, RepositoryChange};
use gitscope_core::ids::{DocumentHandle, DocumentId, DocumentKey};

use crate::active::ActiveContext;
use crate::document::{Lifecycle, ResetReason, TrackedDocument};

const TRACKED_DOCUMENTS_GAUGE: &str = "tracked_documents";

#[derive(Default)]
struct Index {
    by_id: HashMap<DocumentId, Arc<TrackedDocument>>,
    by_key: HashMap<DocumentKey, Arc<TrackedDocument>>,
}

/// Store of tracked documents plus the routes host events enter through.
pub struct DocumentTracker {
    git: Arc<dyn GitProvider>,
    context: Arc<ActiveContext>,
    index: Mutex<Index>,
}

impl DocumentTracker {
    /// Create a tracker publishing through `context`. Marks the
    /// integration enabled in the host.
    pub fn new(git: Arc<dyn GitProvider>, context: Arc<ActiveContext>) -> Arc<Self> {
        context.set_git_enabled(true);
        gauge!(TRACKED_DOCUMENTS_GAUGE).set(0.0);
        Arc::new(Self {
            git,
            context,
            index: Mutex::new(Index::default()),
        })
    }

    /// Create a tracker with its own broker, reading the dirty-clear
    /// idle window from loaded settings.
    pub fn with_sink(git: Arc<dyn GitProvider>, sink: Arc<dyn HostContextSink>) -> Arc<Self> {
        let idle = Duration::from_millis(gitscope_settings::get_settings().tracker.dirty_idle_ms);
        let context = Arc::new(ActiveContext::new(Arc::clone(&git), sink, idle));
        Self::new(git, context)
    }

    /// The broker this tracker publishes through.
    pub fn context(&self) -> &Arc<ActiveContext> {
        &self.context
    }

    /// Register `handle`, initializing the document if it is new.
    ///
    /// Idempotent per host document, and single-instance per normalized
    /// key: a second handle for an already-tracked path is indexed onto
    /// the existing record instead of creating a duplicate.
    pub async fn add(&self, handle: &DocumentHandle) -> Arc<TrackedDocument> {
        let (doc, created) = self.insert(handle);
        if created {
            doc.initialize().await;
        }
        doc
    }

    /// Document for `handle`, consulting both indexes.
    pub fn get(&self, handle: &DocumentHandle) -> Option<Arc<TrackedDocument>> {
        let ix = self.index.lock();
        ix.by_id
            .get(&handle.id)
            .or_else(|| ix.by_key.get(&handle.key()))
            .cloned()
    }

    /// Document by host id.
    pub fn get_by_id(&self, id: DocumentId) -> Option<Arc<TrackedDocument>> {
        self.index.lock().by_id.get(&id).cloned()
    }

    /// Document by raw path or URI, normalized before lookup.
    pub fn get_by_key(&self, raw: &str) -> Option<Arc<TrackedDocument>> {
        let key = DocumentKey::normalize(raw);
        self.index.lock().by_key.get(&key).cloned()
    }

    /// Dispose and drop the document for `handle`. No-op if unknown.
    pub fn remove(&self, handle: &DocumentHandle) {
        let doc = {
            let mut ix = self.index.lock();
            let Some(doc) = ix.by_key.remove(&handle.key()) else {
                return;
            };
            ix.by_id.retain(|_, d| !Arc::ptr_eq(d, &doc));
            gauge!(TRACKED_DOCUMENTS_GAUGE).set(len_of(&ix));
            doc
        };
        doc.dispose();
        self.context.forget(doc.key());
    }

    /// Reset every tracked document.
    pub async fn reset_all(&self, reason: ResetReason) {
        let docs: Vec<Arc<TrackedDocument>> =
            self.index.lock().by_key.values().cloned().collect();
        debug!(count = docs.len(), reason = reason.as_str(), "resetting all documents");
        for doc in docs {
            doc.reset(reason).await;
        }
    }

    /// Number of tracked documents.
    pub fn len(&self) -> usize {
        self.index.lock().by_key.len()
    }

    /// Whether no documents are tracked.
    pub fn is_empty(&self) -> bool {
        self.index.lock().by_key.is_empty()
    }

    /// A document was opened in the host, with its initial dirty state.
    pub async fn on_document_opened(&self, handle: &DocumentHandle, dirty: bool) {
        let doc = self.add(handle).await;
        let _ = doc.set_dirty(dirty);
    }

    /// A document's content changed.
    ///
    /// Lazily tracks unseen documents, invalidates any recorded blame
    /// failure, and applies the dirty policy unless the change was
    /// pre-announced through the one-shot trigger flag.
    pub async fn on_document_changed(&self, handle: &DocumentHandle, dirty: bool) {
        let doc = self.add(handle).await;
        doc.clear_blame_failure().await;

        if doc.consume_trigger_on_next_change() {
            debug!(document = %doc.key(), "suppressing pre-announced change");
            return;
        }
        if doc.set_dirty(dirty) {
            self.context.publish_dirty(doc.key(), dirty);
        }
    }

    /// A document was closed in the host.
    pub fn on_document_closed(&self, handle: &DocumentHandle) {
        self.remove(handle);
    }

    /// Editor focus moved to `handle`, or away from any document.
    ///
    /// The document is activated before its first derivation so the
    /// initial publish is observable downstream.
    pub async fn on_active_editor_changed(&self, handle: Option<&DocumentHandle>) {
        let Some(handle) = handle else {
            self.context.set_active(None).await;
            return;
        };
        let (doc, _) = self.insert(handle);
        self.context
            .set_active(Some((doc.key().clone(), doc.flags())))
            .await;
        if doc.lifecycle() == Lifecycle::Uninitialized {
            doc.initialize().await;
        }
    }

    /// The selection moved within a document. Only ensures tracking; line
    /// positions are a collaborator concern.
    pub async fn on_selection_changed(&self, handle: &DocumentHandle, line: u32) {
        let doc = self.add(handle).await;
        tracing::trace!(document = %doc.key(), line, "selection changed");
    }

    /// Configuration keys changed. Resets all documents when a
    /// tracker-sensitive key is among them.
    pub async fn on_configuration_changed(&self, changed_keys: &[String]) {
        if gitscope_settings::affects_tracker(changed_keys) {
            self.reset_all(ResetReason::ConfigurationChanged).await;
        }
    }

    /// Spawn the repository change listener.
    ///
    /// The task holds only a weak reference and exits when the tracker
    /// is dropped or the provider closes its change stream.
    pub fn spawn_repository_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.git.subscribe_changes();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        let Some(tracker) = weak.upgrade() else { break };
                        tracker.route_repository_change(&change).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "repository change stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("repository change listener stopped");
        })
    }

    async fn route_repository_change(&self, change: &RepositoryChange) {
        let owned: Vec<Arc<TrackedDocument>> = {
            let ix = self.index.lock();
            ix.by_key
                .values()
                .filter(|doc| doc.repository().as_ref() == Some(&change.repository))
                .cloned()
                .collect()
        };
        for doc in owned {
            doc.on_repository_changed(change).await;
        }
    }

    fn insert(&self, handle: &DocumentHandle) -> (Arc<TrackedDocument>, bool) {
        let mut ix = self.index.lock();
        if let Some(doc) = ix.by_id.get(&handle.id) {
            return (Arc::clone(doc), false);
        }
        let key = handle.key();
        if let Some(doc) = ix.by_key.get(&key) {
            // New host id for an already-tracked path.
            let doc = Arc::clone(doc);
            let _ = ix.by_id.insert(handle.id, Arc::clone(&doc));
            return (doc, false);
        }
        let doc = TrackedDocument::new(
            handle.clone(),
            Arc::clone(&self.git),
            Arc::clone(&self.context),
        );
        let _ = ix.by_id.insert(handle.id, Arc::clone(&doc));
        let _ = ix.by_key.insert(key, Arc::clone(&doc));
        gauge!(TRACKED_DOCUMENTS_GAUGE).set(len_of(&ix));
        (doc, true)
    }
}

#[allow(clippy::cast_precision_loss)]
fn len_of(ix: &Index) -> f64 {
    ix.by_key.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::sleep;

    use gitscope_core::context::ContextFlag;
    use gitscope_core::events::TrackerEvent;
    use gitscope_core::git::RepositoryChangeKind;

    use crate::testutil::{FakeGitProvider, RecordingContextSink};

    const URI: &str = "/repo/src/main.rs";

    fn tracker(
        git: &Arc<FakeGitProvider>,
    ) -> (Arc<DocumentTracker>, Arc<RecordingContextSink>) {
        let sink = RecordingContextSink::new();
        let context = Arc::new(ActiveContext::new(
            Arc::clone(git) as Arc<dyn GitProvider>,
            Arc::clone(&sink) as _,
            Duration::from_millis(250),
        ));
        (
            DocumentTracker::new(Arc::clone(git) as Arc<dyn GitProvider>, context),
            sink,
        )
    }

    fn fake_with_tracked_doc() -> Arc<FakeGitProvider> {
        FakeGitProvider::new()
            .with_repository("/repo", true)
            .with_tracked(URI, "/repo")
    }

    fn handle(id: u64, uri: &str) -> DocumentHandle {
        DocumentHandle::new(id, uri)
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);

        let first = tracker.add(&handle(1, URI)).await;
        let second = tracker.add(&handle(1, URI)).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn same_path_under_two_ids_shares_one_record() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);

        let a = tracker.add(&handle(1, URI)).await;
        // Different id, equivalent URI spelling.
        let b = tracker.add(&handle(2, "file:///repo/src/MAIN.RS")).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get_by_id(DocumentId(2)).is_some());
    }

    #[tokio::test]
    async fn lookup_by_key_normalizes() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);
        let _ = tracker.add(&handle(1, URI)).await;

        assert!(tracker.get_by_key("file:///repo/src/main.rs").is_some());
        assert!(tracker.get_by_key("/repo/src/other.rs").is_none());
    }

    #[tokio::test]
    async fn remove_disposes_and_forgets() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);
        let doc = tracker.add(&handle(1, URI)).await;

        tracker.remove(&handle(1, URI));

        assert!(doc.is_disposed());
        assert!(tracker.is_empty());
        assert!(tracker.get_by_id(DocumentId(1)).is_none());

        // Unknown handle is a no-op.
        tracker.remove(&handle(9, "/nowhere.rs"));
    }

    #[tokio::test]
    async fn with_sink_builds_broker_from_settings() {
        gitscope_settings::init_settings(gitscope_settings::ScopeSettings::default());
        let git = fake_with_tracked_doc();
        let sink = RecordingContextSink::new();

        let tracker = DocumentTracker::with_sink(
            Arc::clone(&git) as Arc<dyn GitProvider>,
            Arc::clone(&sink) as _,
        );

        assert_eq!(sink.last(ContextFlag::GitEnabled), Some(true));
        let _ = tracker.add(&handle(1, URI)).await;
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn construction_marks_git_enabled() {
        let git = fake_with_tracked_doc();
        let (_tracker, sink) = tracker(&git);
        assert_eq!(sink.last(ContextFlag::GitEnabled), Some(true));
    }

    #[tokio::test]
    async fn activation_publishes_initial_blame_state() {
        // An untracked document opened via focus publishes its first
        // blame state exactly once.
        let git = FakeGitProvider::new()
            .with_repository("/repo", false)
            .with_untracked(URI, "/repo");
        let (tracker, sink) = tracker(&git);
        let mut rx = tracker.context().subscribe();

        tracker.on_active_editor_changed(Some(&handle(1, URI))).await;

        let key = DocumentKey::normalize(URI);
        assert_eq!(
            rx.try_recv().unwrap(),
            TrackerEvent::BlameStateChanged {
                document: key,
                blameable: false,
            }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(sink.last(ContextFlag::ActiveFileIsTracked), Some(false));
        assert_eq!(sink.last(ContextFlag::ActiveIsBlameable), Some(false));
    }

    #[tokio::test]
    async fn activation_resyncs_remote_flags() {
        // Active repository has no remote; another open one does.
        let git = FakeGitProvider::new()
            .with_repository("/repo", false)
            .with_repository("/shared", true)
            .with_tracked(URI, "/repo");
        let (tracker, sink) = tracker(&git);

        tracker.on_active_editor_changed(Some(&handle(1, URI))).await;

        assert_eq!(sink.last(ContextFlag::ActiveHasRemote), Some(false));
        assert_eq!(sink.last(ContextFlag::HasAnyRemote), Some(true));
    }

    #[tokio::test]
    async fn focus_loss_clears_flags() {
        let git = fake_with_tracked_doc();
        let (tracker, sink) = tracker(&git);
        tracker.on_active_editor_changed(Some(&handle(1, URI))).await;
        assert_eq!(sink.last(ContextFlag::ActiveFileIsTracked), Some(true));

        tracker.on_active_editor_changed(None).await;

        assert_eq!(sink.last(ContextFlag::ActiveFileIsTracked), Some(false));
        assert!(tracker.context().active().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn change_events_drive_dirty_policy() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);
        let h = handle(1, URI);
        tracker.on_active_editor_changed(Some(&h)).await;
        let mut rx = tracker.context().subscribe();

        tracker.on_document_changed(&h, true).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            TrackerEvent::DirtyStateChanged {
                document: DocumentKey::normalize(URI),
                dirty: true,
            }
        );

        // Clear is debounced.
        tracker.on_document_changed(&h, false).await;
        assert!(rx.try_recv().is_err());
        sleep(Duration::from_millis(300)).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            TrackerEvent::DirtyStateChanged {
                document: DocumentKey::normalize(URI),
                dirty: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_document_changes_emit_no_dirty_event() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);
        let mut rx = tracker.context().subscribe();

        tracker.on_document_changed(&handle(1, URI), true).await;
        sleep(Duration::from_millis(500)).await;

        assert!(rx.try_recv().is_err());
        // The document is still tracked and carries the dirty flag.
        assert!(tracker.get_by_key(URI).unwrap().is_dirty());
    }

    #[tokio::test]
    async fn trigger_flag_suppresses_one_change() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);
        let h = handle(1, URI);
        tracker.on_active_editor_changed(Some(&h)).await;
        let doc = tracker.get(&h).unwrap();
        let mut rx = tracker.context().subscribe();

        doc.set_trigger_on_next_change();
        tracker.on_document_changed(&h, true).await;
        assert!(rx.try_recv().is_err());
        assert!(!doc.is_dirty());

        // The flag is one-shot: the next change reacts normally.
        tracker.on_document_changed(&h, true).await;
        assert!(rx.try_recv().is_ok());
        assert!(doc.is_dirty());
    }

    #[tokio::test]
    async fn change_clears_recorded_blame_failure() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);
        let h = handle(1, URI);
        tracker.on_active_editor_changed(Some(&h)).await;
        let doc = tracker.get(&h).unwrap();
        doc.set_blame_failure().await;
        assert!(!doc.is_blameable());

        tracker.on_document_changed(&h, false).await;

        assert!(doc.is_blameable());
    }

    #[tokio::test]
    async fn open_records_initial_dirty_state() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);

        tracker.on_document_opened(&handle(1, URI), true).await;

        let doc = tracker.get_by_key(URI).unwrap();
        assert!(doc.is_dirty());
        assert!(doc.is_tracked());
    }

    #[tokio::test]
    async fn selection_change_tracks_lazily() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);

        tracker.on_selection_changed(&handle(1, URI), 12).await;

        assert_eq!(tracker.len(), 1);
        assert!(tracker.get_by_key(URI).unwrap().is_tracked());
    }

    #[tokio::test]
    async fn sensitive_configuration_change_resets_all() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);
        let doc = tracker.add(&handle(1, URI)).await;
        assert_eq!(doc.generation(), 0);

        tracker
            .on_configuration_changed(&["editor.fontSize".to_string()])
            .await;
        assert_eq!(doc.generation(), 0);

        tracker
            .on_configuration_changed(&["blame.ignoreWhitespace".to_string()])
            .await;
        assert_eq!(doc.generation(), 1);
        assert!(doc.is_tracked());
    }

    #[tokio::test]
    async fn repository_listener_routes_structural_changes() {
        let git = fake_with_tracked_doc();
        let (tracker, _sink) = tracker(&git);
        let doc = tracker.add(&handle(1, URI)).await;
        assert!(doc.is_tracked());

        let listener = tracker.spawn_repository_listener();

        git.set_tracked(URI, false);
        git.emit_change("/repo", RepositoryChangeKind::Index);
        while doc.is_tracked() {
            tokio::task::yield_now().await;
        }
        assert_eq!(doc.generation(), 1);

        // A ref-only update does not invalidate anything.
        git.emit_change("/repo", RepositoryChangeKind::Heads);
        tokio::task::yield_now().await;
        assert_eq!(doc.generation(), 1);

        listener.abort();
    }
}

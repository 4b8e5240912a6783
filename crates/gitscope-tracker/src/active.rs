//! Active-document broker.
//!
//! Exactly one document is "active" at a time. The broker mirrors the
//! active document's flags into the injected [`HostContextSink`], emits
//! blame-state and dirty-state events on its broadcast channel, and
//! enforces the asymmetric dirty policy: dirty `true` publishes
//! immediately, dirty `false` is debounced so save-and-retype churn does
//! not flicker downstream consumers.
//!
//! Publishes for non-active documents are dropped here, in one place,
//! instead of being guarded at every call site.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use gitscope_core::context::{ContextFlag, HostContextSink};
use gitscope_core::events::TrackerEvent;
use gitscope_core::git::GitProvider;
use gitscope_core::ids::DocumentKey;

use crate::debounce::Debouncer;
use crate::document::DocumentFlags;
use crate::emitter::EventEmitter;

struct BrokerState {
    active: Option<DocumentKey>,
    /// Last published blameable value per document, for dedupe. Absence
    /// means never published, so the first publish always fires.
    last_blame: HashMap<DocumentKey, bool>,
    /// Last published dirty value per document, for dedupe.
    last_dirty: HashMap<DocumentKey, bool>,
    /// Flags mirrored for the current active document.
    last_flags: Option<DocumentFlags>,
}

/// Broker for the single active document's published state.
pub struct ActiveContext {
    git: Arc<dyn GitProvider>,
    sink: Arc<dyn HostContextSink>,
    emitter: EventEmitter,
    dirty_debounce: Debouncer,
    state: Mutex<BrokerState>,
}

impl ActiveContext {
    /// Create a broker publishing into `sink`, debouncing dirty-clear by
    /// `dirty_idle`.
    pub fn new(
        git: Arc<dyn GitProvider>,
        sink: Arc<dyn HostContextSink>,
        dirty_idle: Duration,
    ) -> Self {
        Self {
            git,
            sink,
            emitter: EventEmitter::new(),
            dirty_debounce: Debouncer::new(dirty_idle),
            state: Mutex::new(BrokerState {
                active: None,
                last_blame: HashMap::new(),
                last_dirty: HashMap::new(),
                last_flags: None,
            }),
        }
    }

    /// Subscribe to the tracker event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.emitter.subscribe()
    }

    /// Mirror master on/off state of the integration.
    pub fn set_git_enabled(&self, enabled: bool) {
        self.sink.set_flag(ContextFlag::GitEnabled, enabled);
    }

    /// Key of the active document, if any.
    pub fn active(&self) -> Option<DocumentKey> {
        self.state.lock().active.clone()
    }

    /// Whether `key` is the active document.
    pub fn is_active(&self, key: &DocumentKey) -> bool {
        self.state.lock().active.as_ref() == Some(key)
    }

    /// Switch the active document and unconditionally resync every flag.
    ///
    /// `None` means no editor has focus; all per-document flags drop to
    /// false. A pending dirty-clear for the previous document is
    /// cancelled either way.
    pub async fn set_active(&self, doc: Option<(DocumentKey, DocumentFlags)>) {
        self.dirty_debounce.cancel();
        let flags = {
            let mut s = self.state.lock();
            match &doc {
                Some((key, flags)) => {
                    debug!(document = %key, "active document changed");
                    s.active = Some(key.clone());
                    s.last_flags = Some(*flags);
                    *flags
                }
                None => {
                    debug!("active document cleared");
                    s.active = None;
                    s.last_flags = None;
                    DocumentFlags::default()
                }
            }
        };
        self.mirror_flags(flags);
        let aggregate = flags.has_remote || self.any_remote().await;
        self.sink.set_flag(ContextFlag::HasAnyRemote, aggregate);
    }

    /// Publish derived flags for `key`. Dropped unless `key` is active.
    ///
    /// The blame-state event is deduped against the last published value
    /// for the document; `force_blame` bypasses the dedupe (used when a
    /// blame failure downgrades `blameable` without a tracked change).
    ///
    /// The event is emitted inside the same locked section as the dedupe
    /// decision (`emit` is synchronous and non-blocking), so the stream
    /// order always matches the order transitions were recorded; only the
    /// aggregate remote scan happens after the lock is released.
    pub async fn publish(&self, key: &DocumentKey, flags: DocumentFlags, force_blame: bool) {
        {
            let mut s = self.state.lock();
            if s.active.as_ref() != Some(key) {
                return;
            }
            s.last_flags = Some(flags);
            if force_blame || s.last_blame.get(key).copied() != Some(flags.blameable) {
                let _ = s.last_blame.insert(key.clone(), flags.blameable);
                let _ = self.emitter.emit(TrackerEvent::BlameStateChanged {
                    document: key.clone(),
                    blameable: flags.blameable,
                });
            }
        }

        self.mirror_flags(flags);
        let aggregate = flags.has_remote || self.any_remote().await;
        self.sink.set_flag(ContextFlag::HasAnyRemote, aggregate);
    }

    /// Publish a dirty transition for `key`. Dropped unless `key` is
    /// active.
    ///
    /// `true` cancels any pending clear and emits synchronously, so the
    /// caller observes the event before this returns. `false` is
    /// scheduled through the debouncer and re-checks that the document is
    /// still active when the timer fires.
    pub fn publish_dirty(self: &Arc<Self>, key: &DocumentKey, dirty: bool) {
        {
            let s = self.state.lock();
            if s.active.as_ref() != Some(key) {
                return;
            }
        }

        if dirty {
            self.dirty_debounce.cancel();
            {
                let mut s = self.state.lock();
                if s.last_dirty.get(key).copied() == Some(true) {
                    return;
                }
                let _ = s.last_dirty.insert(key.clone(), true);
            }
            let _ = self.emitter.emit(TrackerEvent::DirtyStateChanged {
                document: key.clone(),
                dirty: true,
            });
        } else {
            if self.state.lock().last_dirty.get(key).copied() == Some(false) {
                self.dirty_debounce.cancel();
                return;
            }
            let this = Arc::clone(self);
            let key = key.clone();
            self.dirty_debounce.call(async move {
                let fire = {
                    let mut s = this.state.lock();
                    if s.active.as_ref() == Some(&key) {
                        let _ = s.last_dirty.insert(key.clone(), false);
                        true
                    } else {
                        false
                    }
                };
                if fire {
                    let _ = this.emitter.emit(TrackerEvent::DirtyStateChanged {
                        document: key,
                        dirty: false,
                    });
                }
            });
        }
    }

    /// Drop all memory of `key` (it closed). Deactivates it if active.
    pub fn forget(&self, key: &DocumentKey) {
        let was_active = {
            let mut s = self.state.lock();
            let _ = s.last_blame.remove(key);
            let _ = s.last_dirty.remove(key);
            if s.active.as_ref() == Some(key) {
                s.active = None;
                s.last_flags = None;
                true
            } else {
                false
            }
        };
        if was_active {
            self.dirty_debounce.cancel();
            self.mirror_flags(DocumentFlags::default());
        }
    }

    fn mirror_flags(&self, flags: DocumentFlags) {
        self.sink
            .set_flag(ContextFlag::ActiveIsRevision, flags.is_revision);
        self.sink
            .set_flag(ContextFlag::ActiveFileIsTracked, flags.tracked);
        self.sink
            .set_flag(ContextFlag::ActiveIsBlameable, flags.blameable);
        self.sink
            .set_flag(ContextFlag::ActiveHasRemote, flags.has_remote);
    }

    /// Whether any open repository has a remote. Fail-closed: a query
    /// failure counts as no remote.
    async fn any_remote(&self) -> bool {
        let repos = match self.git.list_repositories().await {
            Ok(repos) => repos,
            Err(e) => {
                warn!(error = %e, "list_repositories failed");
                return false;
            }
        };
        for repo in repos {
            match self.git.repository_has_remote(&repo).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(repository = %repo.as_str(), error = %e, "repository_has_remote failed");
                }
            }
        }
        false
    }
}

//! Notification stream payloads.
//!
//! Two streams leave this subsystem: blame-state changes and dirty-state
//! changes, both scoped to whichever document is currently active. They are
//! broadcast to annotation / status-bar / hover collaborators; consumers
//! subscribe through the tracker's emitter and cancel by dropping the
//! receiver.

use serde::{Deserialize, Serialize};

use crate::ids::DocumentKey;

/// A state-change notification published by the tracker.
///
/// Published for the active document only. State changes on inactive
/// documents update local flags but suppress external notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackerEvent {
    /// The active document's derived blameability flipped.
    ///
    /// `blameable` is `tracked && !blame_failed`; this fires only when the
    /// derived value differs from the last published value for that
    /// document, or when a blame failure forces a recompute.
    #[serde(rename = "blame_state_changed")]
    BlameStateChanged {
        /// Normalized key of the document.
        document: DocumentKey,
        /// Whether per-line attribution UI may be shown.
        blameable: bool,
    },

    /// The active document's dirty flag flipped.
    ///
    /// Becoming dirty publishes immediately; becoming clean is debounced.
    #[serde(rename = "dirty_state_changed")]
    DirtyStateChanged {
        /// Normalized key of the document.
        document: DocumentKey,
        /// Whether the buffer has unsaved edits.
        dirty: bool,
    },
}

impl TrackerEvent {
    /// Get the event type string (for type discrimination).
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::BlameStateChanged { .. } => "blame_state_changed",
            Self::DirtyStateChanged { .. } => "dirty_state_changed",
        }
    }

    /// The document this event concerns.
    #[must_use]
    pub fn document(&self) -> &DocumentKey {
        match self {
            Self::BlameStateChanged { document, .. } | Self::DirtyStateChanged { document, .. } => {
                document
            }
        }
    }
}

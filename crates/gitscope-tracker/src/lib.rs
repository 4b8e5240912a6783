//! # gitscope-tracker
//!
//! Per-document git state tracking and publication.
//!
//! - **Document store**: Dual-indexed registry of tracked documents, host event routes
//! - **Tracked document**: Per-document state machine with generation-guarded async derivation
//! - **Active context**: Single-active-document broker mirroring flags and emitting events
//! - **Debouncer**: Latest-wins deferred execution for the dirty-clear window
//! - **Event emitter**: Broadcast channel wrapper for the tracker event stream
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on: gitscope-core, gitscope-settings.
//! Depended on by: host integrations.

#![deny(unsafe_code)]

pub mod active;
pub mod debounce;
pub mod document;
pub mod emitter;
pub mod store;

#[cfg(test)]
pub mod testutil;

// Re-export main public API
pub use active::ActiveContext;
pub use debounce::Debouncer;
pub use document::{DocumentFlags, Lifecycle, ResetReason, TrackedDocument};
pub use emitter::EventEmitter;
pub use store::DocumentTracker;

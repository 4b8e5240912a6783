//! # gitscope-core
//!
//! Foundation types for the GitScope document-state tracker.
//!
//! This crate provides the shared vocabulary the tracker crates depend on:
//!
//! - **Branded IDs**: [`ids::DocumentId`], [`ids::DocumentKey`],
//!   [`ids::RepositoryId`] as newtypes
//! - **Git seam**: [`git::GitProvider`] async trait plus
//!   [`git::DocumentLocation`] and [`git::RepositoryChange`]
//! - **Host context seam**: [`context::HostContextSink`] and the named
//!   [`context::ContextFlag`] booleans the host's UI-enablement rules read
//! - **Events**: [`events::TrackerEvent`] notification stream payloads
//! - **Errors**: [`errors::GitError`] via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by gitscope-settings and gitscope-tracker.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod events;
pub mod git;
pub mod ids;
pub mod logging;

pub use context::{ContextFlag, HostContextSink, NoopContextSink};
pub use errors::GitError;
pub use events::TrackerEvent;
pub use git::{DocumentLocation, GitProvider, RepositoryChange, RepositoryChangeKind};
pub use ids::{DocumentHandle, DocumentId, DocumentKey, RepositoryId};

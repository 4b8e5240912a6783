//! Host ambient context flags.
//!
//! The host's UI-enablement rules read a set of named booleans. Rather than
//! a process-global setter, the flags are pushed through an injected
//! [`HostContextSink`] so the broker is testable with a recording fake.

/// Named boolean flags mirrored into the host's command context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextFlag {
    /// The active document is pinned to a historical revision.
    ActiveIsRevision,
    /// The active document's path is known to version control.
    ActiveFileIsTracked,
    /// The active document is tracked with no recorded blame failure.
    ActiveIsBlameable,
    /// The active document's own repository has a remote.
    ActiveHasRemote,
    /// Any known repository has a remote (UI gating distinct from the
    /// per-document flag).
    HasAnyRemote,
    /// The git collaborator is available at all.
    GitEnabled,
}

impl ContextFlag {
    /// Stable key string the host reads.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::ActiveIsRevision => "active-is-revision",
            Self::ActiveFileIsTracked => "active-file-is-tracked",
            Self::ActiveIsBlameable => "active-is-blameable",
            Self::ActiveHasRemote => "active-has-remote",
            Self::HasAnyRemote => "has-any-remote",
            Self::GitEnabled => "git-enabled",
        }
    }
}

/// Sink for ambient context flags, implemented by the host adapter.
pub trait HostContextSink: Send + Sync {
    /// Publish a flag value. Must be cheap; called synchronously from
    /// event-handling turns.
    fn set_flag(&self, flag: ContextFlag, value: bool);
}

/// Sink that discards all flags. Useful for headless runs and tests that
/// don't assert on context state.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopContextSink;

impl HostContextSink for NoopContextSink {
    fn set_flag(&self, _flag: ContextFlag, _value: bool) {}
}

use thiserror::Error;

/// A misuse of the retain protocol by the caller.
///
/// These are never returned as errors. They indicate a bug on the calling side (for example in
/// the UI binding layer), so they are logged and then raised as a panic at the call site via
/// [`raise`](Self::raise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// The value of a cache item was read after it was disposed.
    #[error("attempted to access the disposed value of a cache item")]
    AccessAfterDispose,
    /// A temporary retain was requested for an item that already left its parent cache.
    #[error("temporary retain requested for a cache item that is no longer in its parent cache")]
    TemporaryRetainOutsideParentCache,
    /// A permanent retain was requested for a disposed item.
    #[error("permanent retain requested for a disposed cache item")]
    PermanentRetainAfterDispose,
    /// A temporary retain was handed to a different item than the one that issued it.
    #[error("temporary retain was issued by a different cache item")]
    ForeignTemporaryRetain,
    /// A retain was released, but its item was in a state that cannot hold that retain.
    #[error("retain released while the cache item was in an inconsistent state")]
    InconsistentRetainState,
    /// A coordinator was asked to commit without any speculative attempt before it.
    #[error("commit without a preceding speculative attempt")]
    CommitWithoutAttempt,
    /// An updatable slot was assigned before its consumer committed for the first time.
    #[error("assigning state before the first commit is unsafe and disallowed")]
    AssignBeforeCommit,
    /// A reference-counted pointer was released after its item was already disposed.
    #[error("reference-counted pointer released after its item was disposed")]
    ReleaseAfterDispose,
}

impl ProtocolViolation {
    /// Logs the violation and panics.
    #[track_caller]
    pub fn raise(self) -> ! {
        tracing::error!(violation = %self, "disposable state protocol violation");
        panic!("{self}. This indicates a bug in the caller of disposable-state.")
    }
}

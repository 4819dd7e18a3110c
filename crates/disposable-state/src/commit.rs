//! The signals connecting a consumer's lifecycle to the coordinators in this crate.
//!
//! A consumer (for example a UI component) goes through any number of *speculative attempts*,
//! followed by at most one *commit*, and is eventually *discarded*. The binding layer reports
//! attempts and commits by calling `attempt` and `commit` on a coordinator, and discards a
//! consumer by dropping the coordinator. In the other direction, a coordinator asks for one more
//! attempt through an [`AttemptScheduler`].

use std::cell::Cell;

/// Lets a coordinator request one more speculative attempt of its consumer.
///
/// This is needed when the resource handed over at commit time is not the one the last attempt
/// observed.
pub trait AttemptScheduler {
    fn schedule_attempt(&self);
}

impl<F: Fn()> AttemptScheduler for F {
    fn schedule_attempt(&self) {
        self()
    }
}

/// Records whether a consumer has committed for the first time.
#[derive(Debug, Default)]
pub struct CommitTracker(Cell<bool>);

impl CommitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the first commit. Returns `true` if this call was the first commit.
    pub fn mark_committed(&self) -> bool {
        !self.0.replace(true)
    }

    pub fn has_committed(&self) -> bool {
        self.0.get()
    }
}

use std::collections::VecDeque;
use std::fmt;

use crate::commit::CommitTracker;
use crate::disposer::Disposer;
use crate::error::ProtocolViolation;

/// The state of an [`UpdatableSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState<T> {
    /// Nothing was assigned yet.
    Unassigned,
    Assigned(T),
}

/// An assigned value that has not been disposed yet.
///
/// Values are told apart by their `index` rather than by comparing them, since the same value
/// may legitimately be assigned twice with different disposers.
struct PendingAssignment<T> {
    value: T,
    disposer: Disposer,
    index: u64,
}

/// A post-commit holder for values that are supplied from the outside, for example by a manual
/// refetch.
///
/// Assigning is only allowed once the consumer has committed, because a consumer that never
/// commits is never discarded and would leak whatever was assigned to it. Each assignment
/// supersedes the previous one. Superseded values are disposed at the next
/// [`commit`](Self::commit), oldest first; assignments batched between two commits are all kept
/// until then so none is skipped. Dropping the slot disposes the current value and anything
/// still pending.
pub struct UpdatableSlot<T> {
    commit_tracker: CommitTracker,
    // Ordered by index, the current assignment is the last one.
    pending: VecDeque<PendingAssignment<T>>,
    next_index: u64,
}

impl<T> UpdatableSlot<T> {
    pub fn new() -> Self {
        Self {
            commit_tracker: CommitTracker::new(),
            pending: VecDeque::new(),
            next_index: 0,
        }
    }

    pub fn state(&self) -> SlotState<&T> {
        match self.pending.back() {
            Some(current) => SlotState::Assigned(&current.value),
            None => SlotState::Unassigned,
        }
    }

    pub fn has_committed(&self) -> bool {
        self.commit_tracker.has_committed()
    }

    /// Makes `value` the current state. `disposer` runs once `value` is superseded and the next
    /// commit happened, or when the slot is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the consumer has not committed yet.
    pub fn assign(&mut self, value: T, disposer: Disposer) {
        if !self.commit_tracker.has_committed() {
            ProtocolViolation::AssignBeforeCommit.raise();
        }
        let index = self.next_index;
        self.next_index += 1;
        tracing::trace!(index, "assigning updatable slot");
        self.pending.push_back(PendingAssignment {
            value,
            disposer,
            index,
        });
    }

    /// Reports a commit of the consumer, disposing every assignment older than the current one.
    pub fn commit(&mut self) {
        self.commit_tracker.mark_committed();
        let Some(current_index) = self.pending.back().map(|current| current.index) else {
            return;
        };
        while self
            .pending
            .front()
            .is_some_and(|oldest| oldest.index < current_index)
        {
            let Some(oldest) = self.pending.pop_front() else {
                break;
            };
            tracing::trace!(index = oldest.index, "disposing superseded assignment");
            metric!(counter("updatable_slot.disposed") += 1);
            oldest.disposer.dispose();
        }
    }
}

impl<T> Default for UpdatableSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for UpdatableSlot<T> {
    fn drop(&mut self) {
        for assignment in self.pending.drain(..) {
            assignment.disposer.dispose();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for UpdatableSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdatableSlot")
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .field("has_committed", &self.has_committed())
            .finish()
    }
}

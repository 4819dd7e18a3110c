//! Ready-made consumers combining the coordinators with an [`UpdatableSlot`].

use crate::commit::AttemptScheduler;
use crate::disposer::Disposer;
use crate::parent_cache::ParentCache;
use crate::responsive::ResponsivePrecommitValue;
use crate::updatable::{SlotState, UpdatableSlot};

/// A cached value that can be replaced after commit.
///
/// Reads its value from a [`ParentCache`] like a [`ResponsivePrecommitValue`] until something is
/// [`assign`](Self::assign)ed. From the commit after the first assignment on, the assigned values
/// take precedence and the value obtained from the cache is released.
pub struct DisposableState<T: 'static, S> {
    precommit: ResponsivePrecommitValue<T, S>,
    slot: UpdatableSlot<T>,
}

impl<T: Clone + 'static, S: AttemptScheduler> DisposableState<T, S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            precommit: ResponsivePrecommitValue::new(scheduler),
            slot: UpdatableSlot::new(),
        }
    }

    /// Runs a speculative attempt and returns the value to use for it.
    pub fn attempt(&mut self, cache: &ParentCache<T>) -> T {
        let precommit = self.precommit.attempt(cache);
        if let SlotState::Assigned(value) = self.slot.state() {
            return value.clone();
        }
        match precommit {
            Some(value) => value,
            None => match self.precommit.committed() {
                Some(value) => value.clone(),
                None => unreachable!("committed value is only taken once the slot is assigned"),
            },
        }
    }

    /// Reports a commit of the consumer.
    pub fn commit(&mut self) {
        self.precommit.commit();
        self.slot.commit();
        if let SlotState::Assigned(_) = self.slot.state() {
            if let Some((_, disposer)) = self.precommit.take_committed() {
                tracing::debug!("state was assigned, releasing the cached value");
                disposer.dispose();
            }
        }
    }

    /// Replaces the value. See [`UpdatableSlot::assign`].
    ///
    /// # Panics
    ///
    /// Panics if the consumer has not committed yet.
    pub fn assign(&mut self, value: T, disposer: Disposer) {
        self.slot.assign(value, disposer);
    }
}

/// A cached value that follows its [`ParentCache`].
///
/// Every attempt yields a value: the pre-commit value of the current cache, or the committed
/// one. The committed value is released when the consumer commits against another cache, or when
/// this is dropped.
pub struct LazyDisposableState<T: 'static, S> {
    precommit: ResponsivePrecommitValue<T, S>,
}

impl<T: Clone + 'static, S: AttemptScheduler> LazyDisposableState<T, S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            precommit: ResponsivePrecommitValue::new(scheduler),
        }
    }

    /// Runs a speculative attempt and returns the value to use for it.
    pub fn attempt(&mut self, cache: &ParentCache<T>) -> T {
        if let Some(value) = self.precommit.attempt(cache) {
            return value;
        }
        match self.precommit.committed() {
            Some(value) => value.clone(),
            None => unreachable!("a committed cache always has a committed value"),
        }
    }

    pub fn commit(&mut self) {
        self.precommit.commit();
    }
}

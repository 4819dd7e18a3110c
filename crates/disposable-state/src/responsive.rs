use std::fmt;

use crate::commit::{AttemptScheduler, CommitTracker};
use crate::disposer::ItemCleanupPair;
use crate::error::ProtocolViolation;
use crate::parent_cache::ParentCache;
use crate::precommit::Attempt;

/// Like [`PrecommitValue`](crate::PrecommitValue), but starts over whenever the consumer
/// switches to a different [`ParentCache`].
///
/// - Before any commit, attempting with a different cache simply reads the new cache.
/// - After a commit, attempting with a different cache re-enters the pre-commit phase:
///   attempts return the new cache's value, [`committed`](Self::committed) returns `None`, and
///   the next commit hands over a value of the new cache and releases the previous one.
/// - Attempting with the cache that was committed against returns `None`.
///
/// Caches are compared by identity ([`ParentCache::ptr_eq`]). Dropping the coordinator releases
/// the committed value, if it still owns one.
pub struct ResponsivePrecommitValue<T: 'static, S> {
    scheduler: S,
    commit_tracker: CommitTracker,
    last_committed_cache: Option<ParentCache<T>>,
    pending_attempt: Option<Attempt<T>>,
    committed: Option<ItemCleanupPair<T>>,
}

impl<T: Clone + 'static, S: AttemptScheduler> ResponsivePrecommitValue<T, S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            commit_tracker: CommitTracker::new(),
            last_committed_cache: None,
            pending_attempt: None,
            committed: None,
        }
    }

    /// Runs a speculative attempt against `cache`.
    ///
    /// Returns `None` if `cache` is the cache last committed against, and the value to use for
    /// this attempt otherwise.
    pub fn attempt(&mut self, cache: &ParentCache<T>) -> Option<T> {
        if self.is_committed_to(cache) {
            // Switching back to the committed cache abandons the attempts against another one.
            self.pending_attempt = None;
            return None;
        }
        let (attempt, value) = Attempt::start(cache);
        self.pending_attempt = Some(attempt);
        Some(value)
    }

    /// Reports a commit of the consumer.
    ///
    /// This does nothing unless the consumer attempted against a cache other than the committed
    /// one since the last commit.
    ///
    /// # Panics
    ///
    /// Panics if the first commit is not preceded by an attempt.
    pub fn commit(&mut self) {
        self.commit_tracker.mark_committed();
        let Some(attempt) = self.pending_attempt.take() else {
            if self.last_committed_cache.is_none() {
                ProtocolViolation::CommitWithoutAttempt.raise();
            }
            return;
        };

        let cache = attempt.cache().clone();
        let pair = attempt.commit(&self.scheduler);
        if let Some((_, previous)) = self.committed.replace(pair) {
            tracing::debug!("parent cache changed, releasing the previously committed value");
            previous.dispose();
        }
        self.last_committed_cache = Some(cache);
    }
}

impl<T: 'static, S> ResponsivePrecommitValue<T, S> {
    fn is_committed_to(&self, cache: &ParentCache<T>) -> bool {
        self.last_committed_cache
            .as_ref()
            .is_some_and(|committed| ParentCache::ptr_eq(committed, cache))
    }

    pub fn has_committed(&self) -> bool {
        self.commit_tracker.has_committed()
    }

    /// The committed value, unless the consumer has since moved on to another cache.
    pub fn committed(&self) -> Option<&T> {
        if self.pending_attempt.is_some() {
            return None;
        }
        self.committed.as_ref().map(|(value, _)| value)
    }

    /// Takes ownership of the committed value and its disposer.
    ///
    /// A later commit against another cache will not release a taken value.
    pub fn take_committed(&mut self) -> Option<ItemCleanupPair<T>> {
        self.committed.take()
    }
}

impl<T: 'static, S> Drop for ResponsivePrecommitValue<T, S> {
    fn drop(&mut self) {
        if let Some((_, disposer)) = self.committed.take() {
            disposer.dispose();
        }
    }
}

impl<T: fmt::Debug + 'static, S> fmt::Debug for ResponsivePrecommitValue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponsivePrecommitValue")
            .field("has_committed", &self.has_committed())
            .field("pending_attempt", &self.pending_attempt.is_some())
            .field("committed", &self.committed.as_ref().map(|(value, _)| value))
            .finish_non_exhaustive()
    }
}

use std::fmt;

use crate::cache_item::{CacheItem, TemporaryRetain};
use crate::commit::{AttemptScheduler, CommitTracker};
use crate::disposer::ItemCleanupPair;
use crate::error::ProtocolViolation;
use crate::parent_cache::ParentCache;

/// A speculative attempt that has temporarily retained an item of `cache`.
pub(crate) struct Attempt<T: 'static> {
    cache: ParentCache<T>,
    item: CacheItem<T>,
    retain: TemporaryRetain<T>,
}

impl<T: Clone + 'static> Attempt<T> {
    /// Reads `cache` for a speculative attempt.
    ///
    /// The returned value is only guaranteed not to be disposed until control returns to the
    /// scheduler.
    pub(crate) fn start(cache: &ParentCache<T>) -> (Self, T) {
        let (item, value, retain) = cache.get_or_populate_and_temporary_retain();
        let attempt = Self {
            cache: cache.clone(),
            item,
            retain,
        };
        (attempt, value)
    }

    pub(crate) fn cache(&self) -> &ParentCache<T> {
        &self.cache
    }

    /// Converts the attempt into a permanently retained, undisposed pair.
    ///
    /// The temporary retain may have been released or expired since the attempt. In that case
    /// this falls back to whatever the parent cache holds now, and then to a fresh, unshared
    /// value from the factory. Either way the consumer saw a different value during its last
    /// attempt, so one more attempt is scheduled.
    pub(crate) fn commit(self, scheduler: &impl AttemptScheduler) -> ItemCleanupPair<T> {
        let Self {
            cache,
            item,
            retain,
        } = self;

        if let Some(pair) = item.permanent_retain_if_not_disposed(retain) {
            tracing::trace!("committed the item of the last attempt");
            return pair;
        }

        let pair = match cache.get_and_permanent_retain_if_present() {
            Some(pair) => {
                tracing::warn!("temporary retain was gone at commit, reusing parent cache item");
                metric!(counter("commit.recovered") += 1, "source" => "parent_cache");
                pair
            }
            None => {
                tracing::warn!("temporary retain was gone at commit, calling factory");
                metric!(counter("commit.recovered") += 1, "source" => "factory");
                (cache.factory())()
            }
        };
        scheduler.schedule_attempt();
        pair
    }
}

/// Shares a cached value with a consumer until its first commit, then hands it over for good.
///
/// Before the first commit, every [`attempt`](Self::attempt) reads the parent cache and only
/// temporarily retains its item. At the first [`commit`](Self::commit), the temporary retain of
/// the most recent attempt is turned into a permanent one. If that retain is gone by then, the
/// value is recovered from the parent cache or the factory and one more attempt is scheduled.
/// After that the coordinator steps aside: later attempts return `None` and later commits do
/// nothing.
///
/// Dropping the coordinator discards the consumer and releases the committed value, unless it
/// was taken out with [`take_committed`](Self::take_committed).
pub struct PrecommitValue<T: 'static, S> {
    scheduler: S,
    commit_tracker: CommitTracker,
    last_attempt: Option<Attempt<T>>,
    committed: Option<ItemCleanupPair<T>>,
}

impl<T: Clone + 'static, S: AttemptScheduler> PrecommitValue<T, S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            commit_tracker: CommitTracker::new(),
            last_attempt: None,
            committed: None,
        }
    }

    /// Runs a speculative attempt against `cache`.
    ///
    /// Returns the value to use for this attempt, or `None` once the consumer has committed.
    pub fn attempt(&mut self, cache: &ParentCache<T>) -> Option<T> {
        if self.commit_tracker.has_committed() {
            return None;
        }
        // An earlier attempt's temporary retain is left to expire on its own.
        let (attempt, value) = Attempt::start(cache);
        self.last_attempt = Some(attempt);
        Some(value)
    }

    /// Reports a commit of the consumer.
    ///
    /// # Panics
    ///
    /// Panics if the first commit is not preceded by an attempt.
    pub fn commit(&mut self) {
        if !self.commit_tracker.mark_committed() {
            return;
        }
        let Some(attempt) = self.last_attempt.take() else {
            ProtocolViolation::CommitWithoutAttempt.raise();
        };
        self.committed = Some(attempt.commit(&self.scheduler));
    }
}

impl<T: 'static, S> PrecommitValue<T, S> {
    pub fn has_committed(&self) -> bool {
        self.commit_tracker.has_committed()
    }

    /// The value handed over at commit, while this coordinator still owns it.
    pub fn committed(&self) -> Option<&T> {
        self.committed.as_ref().map(|(value, _)| value)
    }

    /// Takes ownership of the committed value and its disposer.
    pub fn take_committed(&mut self) -> Option<ItemCleanupPair<T>> {
        self.committed.take()
    }
}

impl<T: 'static, S> Drop for PrecommitValue<T, S> {
    fn drop(&mut self) {
        if let Some((_, disposer)) = self.committed.take() {
            disposer.dispose();
        }
    }
}

impl<T: fmt::Debug + 'static, S> fmt::Debug for PrecommitValue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrecommitValue")
            .field("has_committed", &self.has_committed())
            .field("committed", &self.committed())
            .finish_non_exhaustive()
    }
}

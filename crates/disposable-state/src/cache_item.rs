use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::config::CacheConfig;
use crate::disposer::{Disposer, ItemCleanupPair};
use crate::error::ProtocolViolation;
use crate::timer::{Timer, TimerHandle};

/// The externally observable state of a [`CacheItem`].
///
/// A cache item only ever moves down this list:
///
/// | In parent cache? | Disposed? | Temporary retains | Permanent retains |
/// |------------------|-----------|-------------------|-------------------|
/// | yes              | no        | > 0               | >= 0              |
/// | no               | no        | 0                 | > 0               |
/// | no               | yes       | 0                 | 0                 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheItemStateKind {
    InParentCacheAndNotDisposed,
    NotInParentCacheAndNotDisposed,
    NotInParentCacheAndDisposed,
}

struct InParentCache<T> {
    value: T,
    dispose_value: Disposer,
    remove_from_parent_cache: Box<dyn FnOnce()>,
    temporary_retain_count: usize,
    permanent_retain_count: usize,
}

struct NotInParentCache<T> {
    value: T,
    dispose_value: Disposer,
    permanent_retain_count: usize,
}

enum CacheItemState<T> {
    InParentCacheAndNotDisposed(InParentCache<T>),
    NotInParentCacheAndNotDisposed(NotInParentCache<T>),
    NotInParentCacheAndDisposed,
}

impl<T> CacheItemState<T> {
    fn kind(&self) -> CacheItemStateKind {
        match self {
            Self::InParentCacheAndNotDisposed(_) => CacheItemStateKind::InParentCacheAndNotDisposed,
            Self::NotInParentCacheAndNotDisposed(_) => {
                CacheItemStateKind::NotInParentCacheAndNotDisposed
            }
            Self::NotInParentCacheAndDisposed => CacheItemStateKind::NotInParentCacheAndDisposed,
        }
    }

    /// Moves to the next state if the retain counts allow it.
    ///
    /// The returned side effects must be run after the state borrow is released, as they call
    /// back into the parent cache and user code.
    fn settle(&mut self) -> Transition {
        let can_leave = match self {
            Self::InParentCacheAndNotDisposed(s) => s.temporary_retain_count == 0,
            Self::NotInParentCacheAndNotDisposed(s) => s.permanent_retain_count == 0,
            Self::NotInParentCacheAndDisposed => false,
        };
        if !can_leave {
            return Transition::default();
        }

        match mem::replace(self, Self::NotInParentCacheAndDisposed) {
            Self::InParentCacheAndNotDisposed(s) if s.permanent_retain_count == 0 => Transition {
                remove_from_parent_cache: Some(s.remove_from_parent_cache),
                dispose_value: Some(s.dispose_value),
            },
            Self::InParentCacheAndNotDisposed(s) => {
                *self = Self::NotInParentCacheAndNotDisposed(NotInParentCache {
                    value: s.value,
                    dispose_value: s.dispose_value,
                    permanent_retain_count: s.permanent_retain_count,
                });
                Transition {
                    remove_from_parent_cache: Some(s.remove_from_parent_cache),
                    dispose_value: None,
                }
            }
            Self::NotInParentCacheAndNotDisposed(s) => Transition {
                remove_from_parent_cache: None,
                dispose_value: Some(s.dispose_value),
            },
            Self::NotInParentCacheAndDisposed => Transition::default(),
        }
    }
}

#[derive(Default)]
struct Transition {
    remove_from_parent_cache: Option<Box<dyn FnOnce()>>,
    dispose_value: Option<Disposer>,
}

impl Transition {
    fn run(self) {
        if let Some(remove_from_parent_cache) = self.remove_from_parent_cache {
            tracing::trace!("removing cache item from its parent cache");
            remove_from_parent_cache();
        }
        if let Some(dispose_value) = self.dispose_value {
            tracing::trace!("disposing cache item");
            metric!(counter("cache_item.disposed") += 1);
            dispose_value.dispose();
        }
    }
}

struct CacheItemInner<T> {
    state: RefCell<CacheItemState<T>>,
    config: CacheConfig,
    timer: Rc<dyn Timer>,
}

/// A retain-counted wrapper around a lazily created value.
///
/// Items are created by a [`ParentCache`](crate::ParentCache) and start out temporarily
/// retained. A temporary retain expires after
/// [`temporary_retain_time`](CacheConfig::temporary_retain_time) unless it is released or
/// upgraded to a permanent retain first. Once the last temporary retain is gone the item removes
/// itself from its parent cache, and once no retains are left at all its value is disposed.
///
/// Cloning a `CacheItem` clones the handle, not the item.
pub struct CacheItem<T: 'static> {
    inner: Rc<CacheItemInner<T>>,
}

impl<T> Clone for CacheItem<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> CacheItem<T> {
    /// Wraps `pair` in a new item that is temporarily retained once.
    ///
    /// `remove_from_parent_cache` is called exactly once, when the last temporary retain is
    /// released or expires.
    pub fn create_temporarily_retained(
        pair: ItemCleanupPair<T>,
        remove_from_parent_cache: impl FnOnce() + 'static,
        config: CacheConfig,
        timer: Rc<dyn Timer>,
    ) -> (Self, TemporaryRetain<T>) {
        let (value, dispose_value) = pair;
        metric!(counter("cache_item.created") += 1);

        // The item starts without any retains, which is only valid because it is temporarily
        // retained before anyone else gets to see it.
        let item = Self {
            inner: Rc::new(CacheItemInner {
                state: RefCell::new(CacheItemState::InParentCacheAndNotDisposed(InParentCache {
                    value,
                    dispose_value,
                    remove_from_parent_cache: Box::new(remove_from_parent_cache),
                    temporary_retain_count: 0,
                    permanent_retain_count: 0,
                })),
                config,
                timer,
            }),
        };
        let temporary_retain = item.temporary_retain();
        (item, temporary_retain)
    }

    /// Returns the value.
    ///
    /// # Panics
    ///
    /// Panics if the item is disposed.
    pub fn get_value(&self) -> T {
        match &*self.inner.state.borrow() {
            CacheItemState::InParentCacheAndNotDisposed(s) => s.value.clone(),
            CacheItemState::NotInParentCacheAndNotDisposed(s) => s.value.clone(),
            CacheItemState::NotInParentCacheAndDisposed => {
                ProtocolViolation::AccessAfterDispose.raise()
            }
        }
    }

    /// Adds a temporary retain which expires on its own after the configured retain time.
    ///
    /// # Panics
    ///
    /// Panics unless the item is still in its parent cache.
    pub fn temporary_retain(&self) -> TemporaryRetain<T> {
        match &mut *self.inner.state.borrow_mut() {
            CacheItemState::InParentCacheAndNotDisposed(s) => s.temporary_retain_count += 1,
            _ => ProtocolViolation::TemporaryRetainOutsideParentCache.raise(),
        }

        let expired = Rc::new(Cell::new(false));
        let timer = self.inner.timer.schedule(
            self.inner.config.temporary_retain_time,
            Box::new({
                let item = self.clone();
                let expired = Rc::clone(&expired);
                move || {
                    expired.set(true);
                    tracing::debug!("temporary retain expired");
                    metric!(counter("temporary_retain.expired") += 1);
                    item.release_temporary_retain();
                }
            }),
        );

        TemporaryRetain {
            item: self.clone(),
            expired,
            timer,
        }
    }

    /// Converts `temporary_retain` into a permanent retain, unless the item is already disposed.
    ///
    /// Adding the permanent retain and releasing the temporary one happen together, so the item
    /// is never left without retains in between. If the item is disposed, the temporary retain
    /// must have expired already and `None` is returned.
    ///
    /// # Panics
    ///
    /// Panics if `temporary_retain` was issued by another item.
    pub fn permanent_retain_if_not_disposed(
        &self,
        temporary_retain: TemporaryRetain<T>,
    ) -> Option<ItemCleanupPair<T>> {
        if !Self::ptr_eq(self, &temporary_retain.item) {
            ProtocolViolation::ForeignTemporaryRetain.raise();
        }

        let value = match &mut *self.inner.state.borrow_mut() {
            CacheItemState::InParentCacheAndNotDisposed(s) => {
                s.permanent_retain_count += 1;
                s.value.clone()
            }
            CacheItemState::NotInParentCacheAndNotDisposed(s) => {
                s.permanent_retain_count += 1;
                s.value.clone()
            }
            CacheItemState::NotInParentCacheAndDisposed => return None,
        };
        temporary_retain.release();

        Some((value, self.permanent_retain_disposer()))
    }

    /// Adds a permanent retain, which lasts until the returned [`Disposer`] runs.
    ///
    /// # Panics
    ///
    /// Panics if the item is disposed.
    pub fn permanent_retain(&self) -> Disposer {
        match &mut *self.inner.state.borrow_mut() {
            CacheItemState::InParentCacheAndNotDisposed(s) => s.permanent_retain_count += 1,
            CacheItemState::NotInParentCacheAndNotDisposed(s) => s.permanent_retain_count += 1,
            CacheItemState::NotInParentCacheAndDisposed => {
                ProtocolViolation::PermanentRetainAfterDispose.raise()
            }
        }
        self.permanent_retain_disposer()
    }

    fn permanent_retain_disposer(&self) -> Disposer {
        let item = self.clone();
        Disposer::new(move || item.release_permanent_retain())
    }

    fn release_temporary_retain(&self) {
        let transition = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                CacheItemState::InParentCacheAndNotDisposed(s) => s.temporary_retain_count -= 1,
                _ => ProtocolViolation::InconsistentRetainState.raise(),
            }
            state.settle()
        };
        transition.run();
    }

    fn release_permanent_retain(&self) {
        let transition = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                CacheItemState::InParentCacheAndNotDisposed(s) => s.permanent_retain_count -= 1,
                CacheItemState::NotInParentCacheAndNotDisposed(s) => {
                    s.permanent_retain_count -= 1
                }
                CacheItemState::NotInParentCacheAndDisposed => {
                    ProtocolViolation::InconsistentRetainState.raise()
                }
            }
            state.settle()
        };
        transition.run();
    }
}

impl<T> CacheItem<T> {
    /// Returns `true` if both handles point to the same item.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.inner, &other.inner)
    }

    pub fn state_kind(&self) -> CacheItemStateKind {
        self.inner.state.borrow().kind()
    }

    pub fn is_disposed(&self) -> bool {
        self.state_kind() == CacheItemStateKind::NotInParentCacheAndDisposed
    }
}

impl<T> fmt::Debug for CacheItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        let mut debug = f.debug_struct("CacheItem");
        debug.field("state", &state.kind());
        match &*state {
            CacheItemState::InParentCacheAndNotDisposed(s) => debug
                .field("temporary_retain_count", &s.temporary_retain_count)
                .field("permanent_retain_count", &s.permanent_retain_count),
            CacheItemState::NotInParentCacheAndNotDisposed(s) => {
                debug.field("permanent_retain_count", &s.permanent_retain_count)
            }
            CacheItemState::NotInParentCacheAndDisposed => &mut debug,
        };
        debug.finish()
    }
}

/// A time-bounded retain on a [`CacheItem`].
///
/// Dropping it leaves the retain in place until it expires. Releasing consumes the handle, so a
/// temporary retain cannot be released twice:
///
/// ```compile_fail
/// # use disposable_state::{ParentCache, Disposer, VirtualTimer};
/// # let cache = ParentCache::with_timer(disposable_state::factory(|| (1, Disposer::noop())), VirtualTimer::new());
/// let (_item, _value, retain) = cache.get_or_populate_and_temporary_retain();
/// retain.release();
/// retain.release();
/// ```
#[must_use = "a temporary retain is only released early if `release` is called"]
pub struct TemporaryRetain<T: 'static> {
    item: CacheItem<T>,
    expired: Rc<Cell<bool>>,
    timer: TimerHandle,
}

impl<T: Clone + 'static> TemporaryRetain<T> {
    /// Releases the retain ahead of its expiry.
    ///
    /// This is a no-op if the retain already expired.
    pub fn release(self) {
        if self.expired.get() {
            return;
        }
        self.timer.cancel();
        self.item.release_temporary_retain();
    }
}

impl<T> TemporaryRetain<T> {
    /// Returns `true` once the retain time elapsed without the retain being released.
    pub fn is_expired(&self) -> bool {
        self.expired.get()
    }
}

impl<T> fmt::Debug for TemporaryRetain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryRetain")
            .field("expired", &self.expired.get())
            .finish_non_exhaustive()
    }
}

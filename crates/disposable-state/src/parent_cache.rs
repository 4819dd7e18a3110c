use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::cache_item::{CacheItem, TemporaryRetain};
use crate::config::CacheConfig;
use crate::disposer::{Factory, ItemCleanupPair};
use crate::timer::{Timer, TokioTimer};

/// The populated slot of a [`ParentCache`].
///
/// `generation` identifies the item that populated the slot, so that an item can only remove
/// itself and never a successor that was put into the slot after it was evicted.
struct Slot<T: 'static> {
    item: CacheItem<T>,
    generation: u64,
}

struct ParentCacheInner<T: 'static> {
    slot: RefCell<Option<Slot<T>>>,
    next_generation: Cell<u64>,
    factory: Factory<T>,
    config: CacheConfig,
    timer: Rc<dyn Timer>,
}

impl<T> ParentCacheInner<T> {
    fn remove_if_current(&self, generation: u64) {
        let mut slot = self.slot.borrow_mut();
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            *slot = None;
        }
    }
}

/// A single-slot cache that lazily creates its [`CacheItem`] with a factory.
///
/// A populated slot always holds an item that is not disposed: items remove themselves from the
/// slot as soon as their last temporary retain is gone. Callers typically keep one
/// `ParentCache` per set of request parameters, see [`ParentCacheMap`](crate::ParentCacheMap).
///
/// Cloning yields another handle to the same cache. Use [`ParentCache::ptr_eq`] to compare
/// caches by identity.
pub struct ParentCache<T: 'static> {
    inner: Rc<ParentCacheInner<T>>,
}

impl<T> Clone for ParentCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> ParentCache<T> {
    /// Creates an empty cache whose temporary retains expire on the tokio clock.
    ///
    /// # Panics
    ///
    /// [`get_or_populate_and_temporary_retain`](Self::get_or_populate_and_temporary_retain)
    /// panics when called outside of a [`LocalSet`](tokio::task::LocalSet), see [`TokioTimer`].
    pub fn new(factory: Factory<T>) -> Self {
        Self::with_config(factory, CacheConfig::default(), TokioTimer)
    }

    /// Creates an empty cache with the default retain time, driven by `timer`.
    pub fn with_timer(factory: Factory<T>, timer: impl Timer + 'static) -> Self {
        Self::with_config(factory, CacheConfig::default(), timer)
    }

    pub fn with_config(
        factory: Factory<T>,
        config: CacheConfig,
        timer: impl Timer + 'static,
    ) -> Self {
        Self::with_shared_timer(factory, config, Rc::new(timer))
    }

    pub(crate) fn with_shared_timer(
        factory: Factory<T>,
        config: CacheConfig,
        timer: Rc<dyn Timer>,
    ) -> Self {
        Self {
            inner: Rc::new(ParentCacheInner {
                slot: RefCell::new(None),
                next_generation: Cell::new(0),
                factory,
                config,
                timer,
            }),
        }
    }

    /// Temporarily retains the cached item, populating the cache with the factory first if it
    /// is empty.
    ///
    /// This is the only place the factory is called for a shared item.
    pub fn get_or_populate_and_temporary_retain(&self) -> (CacheItem<T>, T, TemporaryRetain<T>) {
        let existing = self.inner.slot.borrow().as_ref().map(|s| s.item.clone());
        match existing {
            Some(item) => {
                tracing::trace!("temporarily retaining cached item");
                let retain = item.temporary_retain();
                let value = item.get_value();
                (item, value, retain)
            }
            None => self.populate_and_temporary_retain(),
        }
    }

    fn populate_and_temporary_retain(&self) -> (CacheItem<T>, T, TemporaryRetain<T>) {
        tracing::debug!("populating parent cache");
        let generation = self.inner.next_generation.get();
        self.inner.next_generation.set(generation + 1);

        let pair = (self.inner.factory)();
        let parent: Weak<ParentCacheInner<T>> = Rc::downgrade(&self.inner);
        let (item, retain) = CacheItem::create_temporarily_retained(
            pair,
            move || {
                if let Some(parent) = parent.upgrade() {
                    parent.remove_if_current(generation);
                }
            },
            self.inner.config,
            Rc::clone(&self.inner.timer),
        );

        *self.inner.slot.borrow_mut() = Some(Slot {
            item: item.clone(),
            generation,
        });
        let value = item.get_value();
        (item, value, retain)
    }

    /// Permanently retains the cached item, if there is one. Never calls the factory.
    ///
    /// This is the fallback at commit time when the temporary retain taken earlier is gone but
    /// some other consumer has populated the cache again in the meantime.
    pub fn get_and_permanent_retain_if_present(&self) -> Option<ItemCleanupPair<T>> {
        let item = self.inner.slot.borrow().as_ref().map(|s| s.item.clone())?;
        let disposer = item.permanent_retain();
        Some((item.get_value(), disposer))
    }

    /// The factory this cache populates itself with.
    pub fn factory(&self) -> &Factory<T> {
        &self.inner.factory
    }
}

impl<T> ParentCache<T> {
    /// Empties the slot. The evicted item stays alive for as long as it is retained.
    pub fn empty(&self) {
        *self.inner.slot.borrow_mut() = None;
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slot.borrow().is_none()
    }

    /// Returns `true` if both handles point to the same cache.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.inner, &other.inner)
    }
}

impl<T> fmt::Debug for ParentCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentCache")
            .field("item", &self.inner.slot.borrow().as_ref().map(|s| &s.item))
            .field("config", &self.inner.config)
            .finish()
    }
}

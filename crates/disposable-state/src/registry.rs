use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::config::CacheConfig;
use crate::disposer::Factory;
use crate::parent_cache::ParentCache;
use crate::timer::{Timer, TokioTimer};

/// Keeps one [`ParentCache`] per key, for example per set of request parameters.
///
/// All caches created by the map share its [`CacheConfig`] and [`Timer`]. A cache stays in the
/// map until it is [`remove`](Self::remove)d; [`evict`](Self::evict) only empties it so the next
/// read populates it again.
pub struct ParentCacheMap<K, T: 'static> {
    caches: FxHashMap<K, ParentCache<T>>,
    config: CacheConfig,
    timer: Rc<dyn Timer>,
}

impl<K: Eq + Hash, T: Clone + 'static> ParentCacheMap<K, T> {
    /// Creates an empty map whose caches run on the tokio clock.
    ///
    /// # Panics
    ///
    /// Reading a cache of this map panics when called outside of a
    /// [`LocalSet`](tokio::task::LocalSet), see [`TokioTimer`].
    pub fn new(config: CacheConfig) -> Self {
        Self::with_timer(config, TokioTimer)
    }

    pub fn with_timer(config: CacheConfig, timer: impl Timer + 'static) -> Self {
        Self {
            caches: FxHashMap::default(),
            config,
            timer: Rc::new(timer),
        }
    }

    /// Returns the cache stored under `key`, creating it on first use.
    ///
    /// `make_factory` is only called when the cache is created.
    pub fn get_or_create<F>(&mut self, key: K, make_factory: F) -> ParentCache<T>
    where
        F: FnOnce() -> Factory<T>,
    {
        let config = self.config;
        let timer = &self.timer;
        self.caches
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!("creating parent cache");
                ParentCache::with_shared_timer(make_factory(), config, Rc::clone(timer))
            })
            .clone()
    }

    pub fn get(&self, key: &K) -> Option<ParentCache<T>> {
        self.caches.get(key).cloned()
    }

    /// Empties the cache stored under `key`. Returns `false` if there is none.
    ///
    /// Consumers holding on to the evicted item keep it alive, the next read of the cache calls
    /// its factory again.
    pub fn evict(&self, key: &K) -> bool {
        match self.caches.get(key) {
            Some(cache) => {
                cache.empty();
                true
            }
            None => false,
        }
    }

    /// Removes the cache stored under `key` from the map.
    ///
    /// Items of the removed cache are disposed as usual once their retains are gone. The next
    /// [`get_or_create`](Self::get_or_create) for `key` creates a new, empty cache.
    pub fn remove(&mut self, key: &K) -> Option<ParentCache<T>> {
        self.caches.remove(key)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

impl<K, T> fmt::Debug for ParentCacheMap<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentCacheMap")
            .field("len", &self.caches.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

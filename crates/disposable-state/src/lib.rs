//! Caches for disposable resources that are shared between speculative and committed consumers.
//!
//! Consumers, for example UI components, are *attempted* speculatively any number of times
//! before they *commit* once, and attempts may be thrown away without any notification. A
//! resource read during an attempt therefore cannot be retained permanently. Instead:
//!
//! - A [`ParentCache`] holds at most one [`CacheItem`], populated lazily by a factory.
//! - Attempts take a [`TemporaryRetain`] on the item, which expires on its own after the
//!   configured [retain time](config::CacheConfig::temporary_retain_time).
//! - A commit turns the temporary retain into a permanent one. An item is disposed once it has
//!   neither kind of retain left.
//!
//! [`PrecommitValue`] and [`ResponsivePrecommitValue`] implement this protocol for one consumer,
//! [`UpdatableSlot`] holds values assigned after commit, and [`DisposableState`] and
//! [`LazyDisposableState`] combine them.
//!
//! Everything in this crate is single-threaded. Temporary retains expire through a [`Timer`]:
//! [`TokioTimer`] runs on a tokio `LocalSet`, [`VirtualTimer`] is advanced manually.

#[macro_use]
pub mod metrics;

pub mod cache_item;
pub mod commit;
pub mod config;
pub mod disposer;
pub mod error;
pub mod logging;
pub mod parent_cache;
pub mod precommit;
pub mod refcount;
pub mod registry;
pub mod responsive;
pub mod state;
pub mod timer;
pub mod updatable;

pub use cache_item::{CacheItem, CacheItemStateKind, TemporaryRetain};
pub use commit::{AttemptScheduler, CommitTracker};
pub use config::{CacheConfig, Config};
pub use disposer::{Disposer, Factory, ItemCleanupPair, factory};
pub use error::ProtocolViolation;
pub use parent_cache::ParentCache;
pub use precommit::PrecommitValue;
pub use refcount::{ReferenceCountedPointer, create_reference_counted_pointer};
pub use registry::ParentCacheMap;
pub use responsive::ResponsivePrecommitValue;
pub use state::{DisposableState, LazyDisposableState};
pub use timer::{Timer, TimerHandle, TokioTimer, VirtualTimer};
pub use updatable::{SlotState, UpdatableSlot};

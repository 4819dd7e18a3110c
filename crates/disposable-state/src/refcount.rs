//! Reference-counted pointers to a disposable item.
//!
//! These allow a disposable item to be shared between successive states of a consumer. To move
//! from state 1 to state 2 without disposing the item in between, clone the pointer held by
//! state 1, hand the clone to state 2, and only then release the pointer of state 1. The item is
//! disposed once the last pointer to it is released.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::disposer::{Disposer, ItemCleanupPair};
use crate::error::ProtocolViolation;

struct Counted<T> {
    item: T,
    disposer: Disposer,
    active_references: usize,
}

/// The shared part of all pointers to one item. `None` once the item is disposed.
struct RefCounter<T>(RefCell<Option<Counted<T>>>);

impl<T: 'static> RefCounter<T> {
    fn retain_if_not_disposed(
        self: &Rc<Self>,
    ) -> Option<ItemCleanupPair<ReferenceCountedPointer<T>>> {
        self.0.borrow_mut().as_mut()?.active_references += 1;

        let released = Rc::new(Cell::new(false));
        let pointer = ReferenceCountedPointer {
            counter: Rc::clone(self),
            released: Rc::clone(&released),
        };
        let counter = Rc::clone(self);
        let disposer = Disposer::new(move || {
            released.set(true);
            counter.release();
        });
        Some((pointer, disposer))
    }

    fn release(&self) {
        let disposed = {
            let mut state = self.0.borrow_mut();
            let Some(counted) = state.as_mut() else {
                ProtocolViolation::ReleaseAfterDispose.raise();
            };
            counted.active_references -= 1;
            if counted.active_references > 0 {
                return;
            }
            state.take()
        };

        if let Some(Counted { item, disposer, .. }) = disposed {
            tracing::trace!("last reference-counted pointer released, disposing item");
            disposer.dispose();
            drop(item);
        }
    }
}

/// One active reference to a shared disposable item.
///
/// Each pointer comes with its own [`Disposer`]. A pointer reports itself as disposed as soon as
/// its own disposer ran, regardless of other pointers to the same item.
pub struct ReferenceCountedPointer<T> {
    counter: Rc<RefCounter<T>>,
    released: Rc<Cell<bool>>,
}

impl<T: 'static> ReferenceCountedPointer<T> {
    pub fn is_disposed(&self) -> bool {
        self.released.get()
    }

    /// Creates another pointer to the same item, unless this one was released.
    pub fn clone_if_not_disposed(&self) -> Option<ItemCleanupPair<Self>> {
        if self.is_disposed() {
            return None;
        }
        self.counter.retain_if_not_disposed()
    }
}

impl<T: Clone + 'static> ReferenceCountedPointer<T> {
    /// The item, unless this pointer was released.
    pub fn get_item_if_not_disposed(&self) -> Option<T> {
        if self.is_disposed() {
            return None;
        }
        self.counter
            .0
            .borrow()
            .as_ref()
            .map(|counted| counted.item.clone())
    }
}

impl<T> fmt::Debug for ReferenceCountedPointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCountedPointer")
            .field("disposed", &self.released.get())
            .finish_non_exhaustive()
    }
}

/// Wraps `pair` into a first reference-counted pointer.
///
/// The item's disposer runs exactly once, when the last pointer to it has been released.
pub fn create_reference_counted_pointer<T: 'static>(
    (item, disposer): ItemCleanupPair<T>,
) -> ItemCleanupPair<ReferenceCountedPointer<T>> {
    let counter = Rc::new(RefCounter(RefCell::new(Some(Counted {
        item,
        disposer,
        active_references: 0,
    }))));
    match counter.retain_if_not_disposed() {
        Some(pair) => pair,
        None => unreachable!("a new counter is not disposed"),
    }
}

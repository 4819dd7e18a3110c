//! Delayed callbacks used to expire temporary retains.
//!
//! Everything in this crate runs on a single cooperative scheduler, so timers hand out `!Send`
//! callbacks. [`TokioTimer`] drives them with the tokio clock and has to be used from within a
//! [`LocalSet`](tokio::task::LocalSet). [`VirtualTimer`] is a deterministic clock that is only
//! advanced explicitly, which is what tests and hosts with their own frame loop use.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Schedules callbacks to run once after a delay.
pub trait Timer {
    /// Runs `callback` after `delay` unless the returned handle is cancelled first.
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle;
}

/// Cancels a scheduled callback.
///
/// Dropping the handle leaves the callback scheduled.
pub struct TimerHandle(Box<dyn FnOnce()>);

impl TimerHandle {
    /// Creates a handle that calls `cancel` when cancelled.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self(Box::new(cancel))
    }

    /// Cancels the callback. This is a no-op if it already ran.
    pub fn cancel(self) {
        (self.0)()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle").finish_non_exhaustive()
    }
}

/// A [`Timer`] backed by [`tokio::time::sleep`] on a local task.
///
/// # Panics
///
/// Scheduling panics when called outside of a [`LocalSet`](tokio::task::LocalSet).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(move || task.abort())
    }
}

type Callback = Box<dyn FnOnce()>;

#[derive(Default)]
struct VirtualClock {
    now: Duration,
    next_id: u64,
    // Keyed by deadline, then by scheduling order, so ties fire first-in first-out.
    pending: BTreeMap<(Duration, u64), Callback>,
}

/// A manually advanced [`Timer`].
///
/// Cloning yields another handle to the same clock.
#[derive(Clone, Default)]
pub struct VirtualTimer {
    clock: Rc<RefCell<VirtualClock>>,
}

impl VirtualTimer {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The time elapsed on this clock.
    pub fn now(&self) -> Duration {
        self.clock.borrow().now
    }

    /// The number of callbacks that have neither run nor been cancelled.
    pub fn pending(&self) -> usize {
        self.clock.borrow().pending.len()
    }

    /// Moves the clock forward by `by`, running every callback that becomes due in deadline
    /// order, including callbacks scheduled by other callbacks in the meantime.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        while self.fire_next(Some(target)) {}
        self.clock.borrow_mut().now = target;
    }

    /// Moves the clock to the next deadline and runs the callback due there.
    ///
    /// Returns `false` if nothing was scheduled.
    pub fn advance_to_next(&self) -> bool {
        self.fire_next(None)
    }

    /// Runs callbacks until none are left.
    pub fn run_all(&self) {
        while self.fire_next(None) {}
    }

    fn fire_next(&self, limit: Option<Duration>) -> bool {
        let callback = {
            let mut clock = self.clock.borrow_mut();
            let Some((&(deadline, _), _)) = clock.pending.first_key_value() else {
                return false;
            };
            if limit.is_some_and(|limit| deadline > limit) {
                return false;
            }
            let Some((_, callback)) = clock.pending.pop_first() else {
                return false;
            };
            clock.now = deadline;
            callback
        };
        // The borrow is released here so the callback may schedule or cancel timers.
        callback();
        true
    }
}

impl Timer for VirtualTimer {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let key = {
            let mut clock = self.clock.borrow_mut();
            let key = (clock.now + delay, clock.next_id);
            clock.next_id += 1;
            clock.pending.insert(key, callback);
            key
        };
        let clock: Weak<RefCell<VirtualClock>> = Rc::downgrade(&self.clock);
        TimerHandle::new(move || {
            if let Some(clock) = clock.upgrade() {
                clock.borrow_mut().pending.remove(&key);
            }
        })
    }
}

impl fmt::Debug for VirtualTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.borrow();
        f.debug_struct("VirtualTimer")
            .field("now", &clock.now)
            .field("pending", &clock.pending.len())
            .finish()
    }
}

//! Helpers for testing the disposable-state crate.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Disposers and factories are plain closures here. Wrap the callbacks handed out by
//!    [`DisposeLog`] and [`CallCounter`] into whatever disposer type the code under test expects.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `disposable_state` crate and mutes
///    all other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("disposable_state=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Records which disposers ran, in order.
///
/// Cloning yields another handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct DisposeLog(Rc<RefCell<Vec<String>>>);

impl DisposeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a callback that appends `name` to the log when called.
    pub fn callback(&self, name: impl Into<String>) -> impl FnOnce() + 'static {
        let log = Rc::clone(&self.0);
        let name = name.into();
        move || log.borrow_mut().push(name)
    }

    /// All recorded names, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// How often `name` was recorded.
    pub fn count(&self, name: &str) -> usize {
        self.0.borrow().iter().filter(|n| *n == name).count()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Counts calls, for example of a factory or a `remove_from_parent_cache` callback.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Rc<Cell<usize>>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call and returns the new total.
    pub fn bump(&self) -> usize {
        let calls = self.0.get() + 1;
        self.0.set(calls);
        calls
    }

    /// Returns a callback that records a call when invoked.
    pub fn callback(&self) -> impl Fn() + 'static {
        let counter = self.clone();
        move || {
            counter.bump();
        }
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

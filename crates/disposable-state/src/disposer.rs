use std::fmt;
use std::rc::Rc;

/// A value together with the [`Disposer`] that releases it.
pub type ItemCleanupPair<T> = (T, Disposer);

/// Creates a fresh, undisposed value every time it is called.
pub type Factory<T> = Rc<dyn Fn() -> ItemCleanupPair<T>>;

/// A single-use cleanup function.
///
/// Disposing consumes the `Disposer`, so a cleanup can never run twice:
///
/// ```compile_fail
/// use disposable_state::Disposer;
///
/// let disposer = Disposer::new(|| println!("disposed"));
/// disposer.dispose();
/// disposer.dispose();
/// ```
///
/// Dropping a `Disposer` without calling [`dispose`](Self::dispose) does *not* run it.
#[must_use = "a disposer that is dropped never runs"]
pub struct Disposer(Box<dyn FnOnce()>);

impl Disposer {
    /// Wraps a cleanup function.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    /// A disposer that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Runs the cleanup function.
    pub fn dispose(self) {
        (self.0)()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer").finish_non_exhaustive()
    }
}

/// Wraps a plain closure into a [`Factory`].
pub fn factory<T, F>(f: F) -> Factory<T>
where
    F: Fn() -> ItemCleanupPair<T> + 'static,
{
    Rc::new(f)
}

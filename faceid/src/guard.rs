use parking_lot::Mutex;

/// A process-wide exclusive critical section around one owned value.
///
/// The value is reachable only inside [`Guard::with`], so no reference to it
/// outlives the lock. Reads and writes take the same lock.
#[derive(Debug, Default)]
pub struct Guard<T> {
    inner: Mutex<T>,
}

impl<T> Guard<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Run `f` with exclusive access to the value.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

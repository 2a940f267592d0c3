/// Runs a closure when it goes out of scope, on normal exit and on unwind.
///
/// Tracked threads hold one of these around the user body so that
/// deregistration happens exactly once whichever way the body leaves. The
/// spawner also arms one to roll back an optimistic registration if the
/// thread never starts.
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // Taken on drop or disarm so the closure runs at most once.
    on_exit: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(on_exit: F) -> Self {
        ScopeGuard {
            on_exit: Some(on_exit),
        }
    }

    /// Prevents the closure from ever running.
    pub(crate) fn disarm(&mut self) {
        self.on_exit.take();
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit();
        }
    }
}

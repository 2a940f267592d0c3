//! Thread identities and the equality predicate used to compare them.
//!
//! A registry tracker records the identity of every live thread and removes
//! it when that thread finishes. The spawner learns the identity from the
//! [`JoinHandle`], the finishing thread learns it from itself, and the two
//! views are not guaranteed to be equal as raw values. Comparison therefore
//! always goes through [`IdentityScheme::same_task`], never through `==` on
//! the identity type.
//!
//! Identities may also be recycled once a thread exits, so a registry never
//! assumes they are unique over time.
use std::fmt;
use std::thread::{self, JoinHandle, ThreadId};

#[cfg(target_os = "linux")]
use crate::error::SpawnError;
#[cfg(target_os = "linux")]
use crate::utils::thread::{PthreadEqualFn, current_pthread, resolve_pthread_equal};

/// Identity source and equality predicate for tracked threads.
pub trait IdentityScheme: Send + Sync + fmt::Debug + 'static {
    type Identity: Copy + Send + Sync + fmt::Debug + 'static;

    /// Identity of the thread behind `handle`, as seen by its spawner.
    fn of_handle<T>(&self, handle: &JoinHandle<T>) -> Self::Identity;

    /// Identity of the calling thread, as seen by itself.
    fn current(&self) -> Self::Identity;

    /// Whether `a` and `b` denote the same underlying thread.
    fn same_task(&self, a: &Self::Identity, b: &Self::Identity) -> bool;
}

/// POSIX thread identities compared with `pthread_equal(3)`.
///
/// The predicate is resolved from the process symbol table when the scheme
/// is created, see [`PthreadIdentity::resolve`].
#[cfg(target_os = "linux")]
#[derive(Clone, Copy)]
pub struct PthreadIdentity {
    pthread_equal: PthreadEqualFn,
}

#[cfg(target_os = "linux")]
impl PthreadIdentity {
    /// Resolves `pthread_equal`, failing with
    /// [`SpawnError::IdentityCapabilityUnavailable`] if it is not available.
    pub fn resolve() -> Result<Self, SpawnError> {
        Ok(Self {
            pthread_equal: resolve_pthread_equal()?,
        })
    }
}

#[cfg(target_os = "linux")]
impl fmt::Debug for PthreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PthreadIdentity")
            .field("pthread_equal", &(self.pthread_equal as *const ()))
            .finish()
    }
}

#[cfg(target_os = "linux")]
impl IdentityScheme for PthreadIdentity {
    type Identity = libc::pthread_t;

    fn of_handle<T>(&self, handle: &JoinHandle<T>) -> Self::Identity {
        use std::os::unix::thread::JoinHandleExt;

        handle.as_pthread_t() as libc::pthread_t
    }

    fn current(&self) -> Self::Identity {
        current_pthread()
    }

    fn same_task(&self, a: &Self::Identity, b: &Self::Identity) -> bool {
        // Safety: pthread_equal only compares its arguments, it never
        // dereferences them, so stale identities are fine.
        unsafe { (self.pthread_equal)(*a, *b) != 0 }
    }
}

/// Portable identities backed by [`std::thread::ThreadId`].
///
/// `ThreadId`s are never reused within a process, so plain equality is a
/// correct predicate here.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadIdIdentity;

impl IdentityScheme for ThreadIdIdentity {
    type Identity = ThreadId;

    fn of_handle<T>(&self, handle: &JoinHandle<T>) -> Self::Identity {
        handle.thread().id()
    }

    fn current(&self) -> Self::Identity {
        thread::current().id()
    }

    fn same_task(&self, a: &Self::Identity, b: &Self::Identity) -> bool {
        a == b
    }
}

/// The scheme used by registry trackers unless another one is supplied.
#[cfg(target_os = "linux")]
pub type PlatformIdentity = PthreadIdentity;

#[cfg(not(target_os = "linux"))]
pub type PlatformIdentity = ThreadIdIdentity;

/// Creates the platform scheme, resolving whatever it needs from the OS.
#[cfg(target_os = "linux")]
pub(crate) fn platform_identity() -> Result<PlatformIdentity, SpawnError> {
    PthreadIdentity::resolve()
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn platform_identity() -> Result<PlatformIdentity, crate::error::SpawnError> {
    Ok(ThreadIdIdentity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::mpsc;

    fn assert_handle_matches_self_view<S: IdentityScheme>(scheme: S) -> Result<()> {
        let scheme = std::sync::Arc::new(scheme);
        let (tx, rx) = mpsc::channel();

        let inner = scheme.clone();
        let handle = thread::spawn(move || {
            tx.send(inner.current()).expect("receiver alive");
            // Stay alive until the spawner has compared identities.
            thread::park();
        });

        let from_handle = scheme.of_handle(&handle);
        let from_self = rx.recv()?;

        assert!(scheme.same_task(&from_handle, &from_self));
        assert!(!scheme.same_task(&from_handle, &scheme.current()));

        handle.thread().unpark();
        handle.join().expect("thread panicked");
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pthread_identity_self_view_matches_handle() -> Result<()> {
        assert_handle_matches_self_view(PthreadIdentity::resolve()?)
    }

    #[test]
    fn test_thread_id_identity_self_view_matches_handle() -> Result<()> {
        assert_handle_matches_self_view(ThreadIdIdentity)
    }

    #[test]
    fn test_platform_identity_resolves() -> Result<()> {
        let scheme = platform_identity()?;
        let me = scheme.current();
        assert!(scheme.same_task(&me, &me));
        Ok(())
    }
}

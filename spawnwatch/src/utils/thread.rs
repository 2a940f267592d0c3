use crate::error::SpawnError;
use std::ffi::{CStr, c_void};
use std::mem;
use std::ptr::NonNull;

/// C signature of `pthread_equal(3)`.
pub(crate) type PthreadEqualFn =
    unsafe extern "C" fn(libc::pthread_t, libc::pthread_t) -> libc::c_int;

const PTHREAD_EQUAL: &CStr = c"pthread_equal";

/// Looks up `name` in the global symbol scope of the running process.
pub(crate) fn resolve_symbol(name: &CStr) -> Option<NonNull<c_void>> {
    // Safety: `name` is nul-terminated and RTLD_DEFAULT needs no handle.
    let sym = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
    NonNull::new(sym)
}

/// Resolves `pthread_equal` at runtime. A pthread_t is opaque per POSIX, so
/// two of them may only be compared through this function.
///
/// Statically linked binaries without a dynamic symbol table end up here with
/// nothing to resolve, which is reported as a fatal error.
pub(crate) fn resolve_pthread_equal() -> Result<PthreadEqualFn, SpawnError> {
    let Some(sym) = resolve_symbol(PTHREAD_EQUAL) else {
        return Err(SpawnError::IdentityCapabilityUnavailable {
            symbol: "pthread_equal",
        });
    };

    // Safety: the symbol is libc's `pthread_equal`, whose C signature matches
    // `PthreadEqualFn`.
    Ok(unsafe { mem::transmute::<*mut c_void, PthreadEqualFn>(sym.as_ptr()) })
}

/// The pthread handle of the calling thread.
pub(crate) fn current_pthread() -> libc::pthread_t {
    unsafe { libc::pthread_self() }
}

pub(crate) mod scope_guard;
pub(crate) use scope_guard::ScopeGuard;

#[cfg(target_os = "linux")]
pub(crate) mod thread;

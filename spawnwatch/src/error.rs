use std::collections::TryReserveError;
use std::io;

/// Errors raised while creating a tracker or spawning a tracked thread.
///
/// Errors returned by user bodies are never wrapped here: a [`TaskHandle`]
/// hands back whatever the body returned.
///
/// [`TaskHandle`]: crate::TaskHandle
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The OS refused to start a new thread. Any registration made for it has
    /// already been rolled back when this is returned.
    #[error("failed to start a tracked thread: {0}")]
    ResourceExhaustion(#[from] io::Error),

    /// The identity-equality predicate could not be resolved. Registry
    /// trackers cannot work without it.
    #[error("FATAL: identity equality predicate `{symbol}` is unavailable")]
    IdentityCapabilityUnavailable { symbol: &'static str },

    /// The live set could not grow to hold one more record. The live set is
    /// left exactly as it was.
    #[error("FATAL: could not grow the live thread registry: {0}")]
    AllocationFailure(#[from] TryReserveError),
}

impl SpawnError {
    /// Whether the error means the tracker cannot be used at all, as opposed
    /// to a single spawn attempt failing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SpawnError::IdentityCapabilityUnavailable { .. })
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SpawnError::ResourceExhaustion(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

impl PartialEq for SpawnError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ResourceExhaustion(a), Self::ResourceExhaustion(b)) => a.kind() == b.kind(),
            (
                Self::IdentityCapabilityUnavailable { symbol: a },
                Self::IdentityCapabilityUnavailable { symbol: b },
            ) => a == b,
            (Self::AllocationFailure(_), Self::AllocationFailure(_)) => true,
            _ => false,
        }
    }
}

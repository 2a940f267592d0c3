use crate::identity::IdentityScheme;
use parking_lot::{Condvar, Mutex};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle, ThreadId};
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Routes tracing output through the test harness. Safe to call from every
/// test, only the first call installs the subscriber.
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Blocks tracked bodies until the test lets them go.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cv.wait(&mut open);
        }
    }

    pub(crate) fn open(&self) {
        *self.open.lock() = true;
        self.cv.notify_all();
    }
}

/// Counts how many [`DropToken`]s it handed out were dropped.
#[derive(Debug, Default, Clone)]
pub(crate) struct DropCounter {
    issued: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
}

impl DropCounter {
    pub(crate) fn token(&self) -> DropToken {
        self.issued.fetch_add(1, Ordering::AcqRel);
        DropToken {
            dropped: Arc::clone(&self.dropped),
        }
    }

    pub(crate) fn issued(&self) -> usize {
        self.issued.load(Ordering::Acquire)
    }

    pub(crate) fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub(crate) struct DropToken {
    dropped: Arc<AtomicUsize>,
}

impl Drop for DropToken {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::AcqRel);
    }
}

/// Identity scheme that folds every thread into one of `buckets` identities,
/// so that distinct live threads compare equal the way recycled identities
/// would.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CollidingIdentity {
    buckets: u64,
}

impl CollidingIdentity {
    pub(crate) fn new(buckets: u64) -> Self {
        assert!(buckets > 0, "at least one bucket is required");
        Self { buckets }
    }

    fn bucket(&self, id: ThreadId) -> u64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish() % self.buckets
    }
}

impl IdentityScheme for CollidingIdentity {
    type Identity = u64;

    fn of_handle<T>(&self, handle: &JoinHandle<T>) -> Self::Identity {
        self.bucket(handle.thread().id())
    }

    fn current(&self) -> Self::Identity {
        self.bucket(thread::current().id())
    }

    fn same_task(&self, a: &Self::Identity, b: &Self::Identity) -> bool {
        a == b
    }
}

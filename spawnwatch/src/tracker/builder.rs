use crate::error::SpawnError;
use crate::identity::{IdentityScheme, platform_identity};
use crate::tracker::{SpawnCounter, SpawnRegistry, Tracker};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// How long the supervising thread sleeps between two live-count reads.
#[cfg(not(test))]
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[cfg(test)]
const POLL_INTERVAL: Duration = Duration::from_millis(10); // make tests drain faster

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Counting,
    Registry,
}

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let spawned = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let id = spawned.fetch_add(1, Ordering::Relaxed);
        format!("spawnwatch-{}", id)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

#[derive(Debug)]
pub struct Builder {
    /// Tracker flavor built by `try_build`.
    kind: Kind,

    /// Name fn used for every tracked thread.
    thread_name: ThreadNameFn,

    /// Stack size used for every tracked thread. Platform default when unset.
    thread_stack_size: Option<usize>,

    /// Sleep between two live-count reads while waiting for drain.
    poll_interval: Duration,

    /// One-off sleep before the first live-count read while waiting for
    /// drain. Registration is synchronous with `spawn`, so this only matters
    /// when the first tracked spawn is issued from an untracked thread that
    /// may not have run yet.
    startup_grace: Duration,
}

impl Builder {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            poll_interval: POLL_INTERVAL,
            startup_grace: Duration::ZERO,
        }
    }

    /// Returns a builder for a tracker that only counts live threads.
    pub fn new_counting() -> Builder {
        Builder::new(Kind::Counting)
    }

    /// Returns a builder for a tracker that records the identity of every
    /// live thread.
    pub fn new_registry() -> Builder {
        Builder::new(Kind::Registry)
    }

    /// Sets the name of every tracked thread.
    ///
    /// The default name is "spawnwatch-{id}", where id is monotonically
    /// increasing.
    ///
    /// Thread names are truncated beyond 15 bytes according to pthread
    /// limitations.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of every tracked thread.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) of every tracked thread.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// specifies minimal stack size.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(val > 0, "thread_stack_size must be greater than 0");
        self.thread_stack_size = Some(val);
        self
    }

    /// Sets how long [`Track::wait_for_drain`] sleeps between two reads of
    /// the live count.
    ///
    /// Defaults to one second. Smaller values notice the drain sooner at the
    /// cost of more wake-ups.
    ///
    /// [`Track::wait_for_drain`]: crate::Track::wait_for_drain
    #[track_caller]
    pub fn poll_interval(mut self, val: Duration) -> Self {
        assert!(!val.is_zero(), "poll_interval must be greater than 0");
        self.poll_interval = val;
        self
    }

    /// Sets a one-off delay before [`Track::wait_for_drain`] reads the live
    /// count for the first time. Defaults to zero.
    ///
    /// [`Track::wait_for_drain`]: crate::Track::wait_for_drain
    pub fn startup_grace(mut self, val: Duration) -> Self {
        self.startup_grace = val;
        self
    }

    /// Creates the configured tracker.
    ///
    /// Registry trackers resolve the platform identity predicate here and
    /// fail with [`SpawnError::IdentityCapabilityUnavailable`] if it cannot
    /// be found. No thread is spawned in that case.
    pub fn try_build(self) -> Result<Tracker, SpawnError> {
        match self.kind {
            Kind::Counting => Ok(Tracker::Counting(SpawnCounter::new(self.into()))),
            Kind::Registry => {
                let scheme = platform_identity()?;
                Ok(Tracker::Registry(SpawnRegistry::new(scheme, self.into())))
            }
        }
    }

    /// Creates a registry tracker comparing identities with `scheme`,
    /// whichever flavor the builder was created for.
    pub fn build_registry_with<S: IdentityScheme>(self, scheme: S) -> SpawnRegistry<S> {
        SpawnRegistry::new(scheme, self.into())
    }
}

/// Settings shared by every handle of one tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) poll_interval: Duration,
    pub(crate) startup_grace: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Builder::new(Kind::Counting).into()
    }
}

impl TrackerConfig {
    pub fn thread_stack_size(&self) -> Option<usize> {
        self.thread_stack_size
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn startup_grace(&self) -> Duration {
        self.startup_grace
    }

    /// A `std::thread::Builder` for the next tracked thread.
    pub(crate) fn thread_builder(&self) -> thread::Builder {
        let mut builder = thread::Builder::new().name(self.thread_name.0());

        if let Some(stack_size) = self.thread_stack_size {
            builder = builder.stack_size(stack_size);
        }

        builder
    }
}

impl From<Builder> for TrackerConfig {
    fn from(builder: Builder) -> Self {
        TrackerConfig {
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            poll_interval: builder.poll_interval,
            startup_grace: builder.startup_grace,
        }
    }
}

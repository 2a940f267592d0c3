use crate::error::SpawnError;
use std::fmt;
use std::thread::{self, Thread};

// Public API
pub mod builder;
pub use builder::{Builder, TrackerConfig};

pub mod counter;
pub use counter::SpawnCounter;

pub mod registry;
pub use registry::SpawnRegistry;

mod drain;
pub use drain::DrainReport;


/// Shared contract of every tracker flavor.
///
/// A tracker wraps thread creation so that the process can tell when every
/// thread it spawned through it, transitively, has finished. Trackers are
/// cheap handles: clone one into a body to let that body spawn tracked
/// children of its own.
pub trait Track: Clone + Send + Sync + fmt::Debug + 'static {
    /// Spawns a thread running `body(arg)`.
    ///
    /// The thread is recorded as live before it can possibly finish and is
    /// recorded as gone right after `body` returns or unwinds. The returned
    /// handle may be joined or simply dropped, the thread is tracked either
    /// way.
    fn spawn<F, A, R>(&self, body: F, arg: A) -> Result<TaskHandle<R>, SpawnError>
    where
        F: FnOnce(A) -> R + Send + 'static,
        A: Send + 'static,
        R: Send + 'static;

    /// Number of tracked threads that have not finished yet.
    ///
    /// The value may be stale as soon as it is returned.
    fn live_count(&self) -> usize;

    fn config(&self) -> &TrackerConfig;

    /// True when no tracked thread is live.
    ///
    /// This only says that every *known* thread finished. Callers must make
    /// sure no new root-level spawn races with the check.
    fn is_drained(&self) -> bool {
        self.live_count() == 0
    }

    /// Blocks the calling thread until the tracker is drained, polling at
    /// [`TrackerConfig::poll_interval`].
    fn wait_for_drain(&self) -> DrainReport {
        drain::wait_for_drain(self)
    }

    /// Runs `entry` on the calling thread, then waits until every thread it
    /// spawned through this tracker, transitively, has finished.
    fn run<F, R>(&self, entry: F) -> R
    where
        F: FnOnce(&Self) -> R,
    {
        let out = entry(self);
        self.wait_for_drain();
        out
    }
}

/// A tracker of either flavor, as produced by [`Builder::try_build`].
#[derive(Debug, Clone)]
pub enum Tracker {
    Counting(SpawnCounter),
    Registry(SpawnRegistry),
}

impl Track for Tracker {
    fn spawn<F, A, R>(&self, body: F, arg: A) -> Result<TaskHandle<R>, SpawnError>
    where
        F: FnOnce(A) -> R + Send + 'static,
        A: Send + 'static,
        R: Send + 'static,
    {
        match self {
            Tracker::Counting(counter) => counter.spawn(body, arg),
            Tracker::Registry(registry) => registry.spawn(body, arg),
        }
    }

    fn live_count(&self) -> usize {
        match self {
            Tracker::Counting(counter) => counter.live_count(),
            Tracker::Registry(registry) => registry.live_count(),
        }
    }

    fn config(&self) -> &TrackerConfig {
        match self {
            Tracker::Counting(counter) => counter.config(),
            Tracker::Registry(registry) => registry.config(),
        }
    }
}

// Test-only helpers
#[cfg(test)]
impl Tracker {
    pub(crate) fn expect_counter(&self) -> &SpawnCounter {
        match self {
            Tracker::Counting(counter) => counter,
            _ => panic!("Tracker not using a counter"),
        }
    }

    pub(crate) fn expect_registry(&self) -> &SpawnRegistry {
        match self {
            Tracker::Registry(registry) => registry,
            _ => panic!("Tracker not using a registry"),
        }
    }
}

/// Owned permission to join a tracked thread.
///
/// Dropping the handle detaches the thread; it stays tracked until it
/// finishes.
#[derive(Debug)]
pub struct TaskHandle<R> {
    inner: thread::JoinHandle<R>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(inner: thread::JoinHandle<R>) -> Self {
        Self { inner }
    }

    pub fn thread(&self) -> &Thread {
        self.inner.thread()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Waits for the thread to finish and returns what its body returned.
    ///
    /// Once this returns the thread has already been deregistered.
    pub fn join(self) -> thread::Result<R> {
        self.inner.join()
    }
}

/// The user body and its argument, moved as one value from the spawner into
/// the new thread and consumed there exactly once.
pub(crate) struct SpawnArgs<F, A> {
    body: F,
    arg: A,
}

impl<F, A> SpawnArgs<F, A> {
    pub(crate) fn new(body: F, arg: A) -> Self {
        Self { body, arg }
    }

    pub(crate) fn invoke<R>(self) -> R
    where
        F: FnOnce(A) -> R,
    {
        (self.body)(self.arg)
    }
}

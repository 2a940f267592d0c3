use crate::error::SpawnError;
use crate::identity::{IdentityScheme, PlatformIdentity};
use crate::tracker::{SpawnArgs, TaskHandle, Track, TrackerConfig};
use crate::utils::ScopeGuard;
use parking_lot::Mutex;
use std::collections::TryReserveError;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

// Below this capacity the live set never gives memory back.
const MIN_RETAINED_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy)]
struct TaskRecord<I> {
    identity: I,
}

/// Identities of the threads currently believed live. Order carries no
/// meaning, removal swaps the last record into the freed slot.
#[derive(Debug)]
pub(crate) struct LiveSet<I> {
    records: Vec<TaskRecord<I>>,
}

impl<I: Copy> LiveSet<I> {
    pub(crate) fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Makes room for one more record so that the following `insert` cannot
    /// fail halfway.
    pub(crate) fn reserve_one(&mut self) -> Result<(), TryReserveError> {
        self.records.try_reserve(1)
    }

    pub(crate) fn insert(&mut self, identity: I) {
        self.records.push(TaskRecord { identity });
    }

    /// Removes the first record `matches` accepts and nothing else, even if
    /// more records would match.
    pub(crate) fn remove_first<P>(&mut self, mut matches: P) -> Option<I>
    where
        P: FnMut(&I) -> bool,
    {
        let idx = self
            .records
            .iter()
            .position(|record| matches(&record.identity))?;

        let record = self.records.swap_remove(idx);
        self.shrink_if_sparse();

        Some(record.identity)
    }

    pub(crate) fn identities(&self) -> Vec<I> {
        self.records.iter().map(|record| record.identity).collect()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.records.capacity()
    }

    // Halve the storage once it is three quarters empty, so that a burst of
    // fan-out does not pin its peak allocation forever.
    fn shrink_if_sparse(&mut self) {
        let capacity = self.records.capacity();

        if capacity > MIN_RETAINED_CAPACITY && self.records.len() <= capacity / 4 {
            self.records
                .shrink_to(MIN_RETAINED_CAPACITY.max(capacity / 2));
        }
    }
}

struct Registry<S: IdentityScheme> {
    scheme: S,
    live: Mutex<LiveSet<S::Identity>>,
}

impl<S: IdentityScheme> Registry<S> {
    /// Completion hook, runs on the finishing thread itself.
    fn deregister_current(&self) {
        let me = self.scheme.current();
        let mut live = self.live.lock();

        match live.remove_first(|identity| self.scheme.same_task(identity, &me)) {
            Some(_) => trace!(live = live.len(), "deregistered thread"),
            None => warn!(
                identity = ?me,
                live = live.len(),
                "finished thread was not registered"
            ),
        }
    }
}

impl<S: IdentityScheme> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("scheme", &self.scheme)
            .field("live", &self.live)
            .finish()
    }
}

/// Tracks the identity of every spawned thread that is still live.
///
/// Spawning and registration happen under one lock, and the finishing thread
/// must take that same lock to remove itself. A body that returns before its
/// spawner is done with bookkeeping therefore always finds its own record.
pub struct SpawnRegistry<S: IdentityScheme = PlatformIdentity> {
    registry: Arc<Registry<S>>,
    cfg: Arc<TrackerConfig>,
}

impl<S: IdentityScheme> SpawnRegistry<S> {
    pub(crate) fn new(scheme: S, cfg: TrackerConfig) -> Self {
        Self {
            registry: Arc::new(Registry {
                scheme,
                live: Mutex::new(LiveSet::new()),
            }),
            cfg: Arc::new(cfg),
        }
    }

    pub fn scheme(&self) -> &S {
        &self.registry.scheme
    }

    /// Snapshot of the identities currently registered, in no particular
    /// order.
    pub fn live_identities(&self) -> Vec<S::Identity> {
        self.registry.live.lock().identities()
    }
}

impl<S: IdentityScheme> Clone for SpawnRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            cfg: Arc::clone(&self.cfg),
        }
    }
}

impl<S: IdentityScheme> fmt::Debug for SpawnRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnRegistry")
            .field("registry", &self.registry)
            .field("cfg", &self.cfg)
            .finish()
    }
}

impl<S: IdentityScheme> Track for SpawnRegistry<S> {
    fn spawn<F, A, R>(&self, body: F, arg: A) -> Result<TaskHandle<R>, SpawnError>
    where
        F: FnOnce(A) -> R + Send + 'static,
        A: Send + 'static,
        R: Send + 'static,
    {
        let args = SpawnArgs::new(body, arg);
        let registry = Arc::clone(&self.registry);

        let mut live = self.registry.live.lock();

        // Grow first: once the thread is running its record must go in.
        live.reserve_one()?;

        let handle = self.cfg.thread_builder().spawn(move || {
            let _deregister = ScopeGuard::new(|| registry.deregister_current());
            args.invoke()
        })?;

        let identity = self.registry.scheme.of_handle(&handle);
        live.insert(identity);
        trace!(live = live.len(), ?identity, "registered thread");
        drop(live);

        debug!(thread = ?handle.thread().name(), "spawned registered thread");
        Ok(TaskHandle::new(handle))
    }

    fn live_count(&self) -> usize {
        self.registry.live.lock().len()
    }

    fn config(&self) -> &TrackerConfig {
        &self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ThreadIdIdentity;
    use crate::test_utils::*;
    use crate::tracker::Builder;
    use anyhow::Result;
    use static_assertions::assert_impl_all;
    use std::sync::mpsc;

    assert_impl_all!(SpawnRegistry: Send, Sync, Clone);
    assert_impl_all!(SpawnRegistry<CollidingIdentity>: Send, Sync, Clone);

    #[test]
    fn test_remove_first_removes_one_duplicate() {
        let mut live = LiveSet::new();
        for identity in [7, 3, 7, 7] {
            live.reserve_one().expect("tiny allocation");
            live.insert(identity);
        }

        assert_eq!(live.remove_first(|id| *id == 7), Some(7));
        assert_eq!(live.len(), 3);

        let mut remaining = live.identities();
        remaining.sort();
        assert_eq!(remaining, vec![3, 7, 7]);
    }

    #[test]
    fn test_remove_first_without_match_leaves_set_untouched() {
        let mut live = LiveSet::new();
        live.insert(1u64);
        live.insert(2u64);

        assert_eq!(live.remove_first(|id| *id == 9), None);
        assert_eq!(live.len(), 2);
        assert!(!live.is_empty());
    }

    #[test]
    fn test_live_set_gives_back_memory_after_burst() {
        let mut live = LiveSet::new();
        for identity in 0..1024u64 {
            live.insert(identity);
        }
        let peak = live.capacity();

        for identity in 0..1024u64 {
            assert_eq!(live.remove_first(|id| *id == identity), Some(identity));
        }

        assert!(live.is_empty());
        assert!(live.capacity() < peak);
        assert!(live.capacity() >= MIN_RETAINED_CAPACITY);
    }

    #[test]
    fn test_registered_identity_is_the_thread_itself() -> Result<()> {
        init_test_logging();
        let registry = Builder::new_registry().build_registry_with(ThreadIdIdentity);
        let gate = Gate::new();
        let (tx, rx) = mpsc::channel();

        let scheme = *registry.scheme();
        let handle = registry.spawn(
            move |(gate, tx): (Arc<Gate>, mpsc::Sender<_>)| {
                tx.send(scheme.current()).expect("receiver alive");
                gate.wait();
            },
            (gate.clone(), tx),
        )?;

        let reported = rx.recv()?;
        let registered = registry.live_identities();
        assert_eq!(registered.len(), 1);
        assert!(registry.scheme().same_task(&registered[0], &reported));

        gate.open();
        handle.join().expect("thread panicked");
        assert!(registry.live_identities().is_empty());
        Ok(())
    }

    #[test]
    fn test_colliding_identities_remove_one_record_per_completion() -> Result<()> {
        init_test_logging();
        // A single bucket: every thread compares equal to every other one.
        let registry = Builder::new_registry().build_registry_with(CollidingIdentity::new(1));
        let gate = Gate::new();
        let n = 32;

        let handles = (0..n)
            .map(|_| registry.spawn(|gate: Arc<Gate>| gate.wait(), gate.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(registry.live_count(), n);

        gate.open();
        for (finished, handle) in handles.into_iter().enumerate() {
            handle.join().expect("thread panicked");
            // Completions by other threads may race ahead of this join, but
            // never past it.
            assert!(registry.live_count() <= n - finished - 1);
        }

        assert_eq!(registry.live_count(), 0);
        Ok(())
    }

    #[test]
    fn test_colliding_identities_under_fan_out() -> Result<()> {
        let registry = Builder::new_registry().build_registry_with(CollidingIdentity::new(3));
        let handles = (0..256)
            .map(|i| registry.spawn(move |_: ()| i * 2, ()))
            .collect::<Result<Vec<_>, _>>()?;

        let sum: usize = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .sum();

        assert_eq!(sum, (0..256).map(|i| i * 2).sum());
        assert_eq!(registry.live_count(), 0);
        Ok(())
    }
}

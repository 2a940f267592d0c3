use crate::error::SpawnError;
use crate::tracker::{SpawnArgs, TaskHandle, Track, TrackerConfig};
use crate::utils::ScopeGuard;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct LiveCount {
    live: AtomicUsize,

    // Serializes counter updates with their trace events so the log reads in
    // counter order. Correctness never depends on it, readers go straight to
    // the atomic.
    log_order: Mutex<()>,
}

impl LiveCount {
    fn register(&self) {
        let _order = self.log_order.lock();
        let live = self.live.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(live, "registered thread");
    }

    fn deregister(&self) {
        let _order = self.log_order.lock();
        let prev = self.live.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "deregistered more threads than were registered");
        trace!(live = prev - 1, "deregistered thread");
    }

    fn load(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// Tracks only how many spawned threads are still live.
///
/// The count is bumped before the thread is started and dropped by the thread
/// itself once its body is done, so it can never read zero while a tracked
/// body is still running.
#[derive(Debug, Clone)]
pub struct SpawnCounter {
    count: Arc<LiveCount>,
    cfg: Arc<TrackerConfig>,
}

impl SpawnCounter {
    pub(crate) fn new(cfg: TrackerConfig) -> Self {
        Self {
            count: Arc::new(LiveCount::default()),
            cfg: Arc::new(cfg),
        }
    }
}

impl Track for SpawnCounter {
    fn spawn<F, A, R>(&self, body: F, arg: A) -> Result<TaskHandle<R>, SpawnError>
    where
        F: FnOnce(A) -> R + Send + 'static,
        A: Send + 'static,
        R: Send + 'static,
    {
        let args = SpawnArgs::new(body, arg);

        // Count the thread before it exists, it could finish before `spawn`
        // returns. Undo it if the thread never starts.
        self.count.register();
        let mut rollback = ScopeGuard::new(|| self.count.deregister());

        let count = Arc::clone(&self.count);
        let handle = self.cfg.thread_builder().spawn(move || {
            let _deregister = ScopeGuard::new(|| count.deregister());
            args.invoke()
        })?;

        rollback.disarm();
        debug!(thread = ?handle.thread().name(), "spawned counted thread");

        Ok(TaskHandle::new(handle))
    }

    fn live_count(&self) -> usize {
        self.count.load()
    }

    fn config(&self) -> &TrackerConfig {
        &self.cfg
    }
}

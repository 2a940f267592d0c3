//! Recursive fan-out workload used to stress trackers.
//!
//! Every body spawns `width` children through the same tracker as long as a
//! shared countdown can be decremented, producing genuinely concurrent
//! exponential fan-out until the countdown collapses it.
//!
//! ```no_run
//! use spawnwatch::{Builder, FanOut, Track, spawn_fan_out};
//! use std::sync::Arc;
//!
//! let tracker = Builder::new_registry().try_build().unwrap();
//! let plan = Arc::new(FanOut::new(100, 2));
//!
//! tracker.run(|tracker| spawn_fan_out(tracker, plan.clone())).unwrap();
//! assert_eq!(plan.executed(), FanOut::total_bodies(100, 2));
//! ```
use crate::error::SpawnError;
use crate::tracker::{TaskHandle, Track};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Shape of a fan-out run, shared by every body taking part in it.
#[derive(Debug)]
pub struct FanOut {
    countdown: AtomicUsize,
    width: usize,
    delay: Option<Duration>,
    executed: AtomicUsize,
    spawn_failures: AtomicUsize,
}

impl FanOut {
    /// A run where `countdown` bodies each get to spawn `width` children.
    pub fn new(countdown: usize, width: usize) -> Self {
        Self {
            countdown: AtomicUsize::new(countdown),
            width,
            delay: None,
            executed: AtomicUsize::new(0),
            spawn_failures: AtomicUsize::new(0),
        }
    }

    /// Makes every body sleep for `delay` before it branches, widening the
    /// window in which completions race with spawns.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of bodies that have started so far.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Acquire)
    }

    pub fn spawn_failures(&self) -> usize {
        self.spawn_failures.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.countdown.load(Ordering::Acquire)
    }

    /// Bodies a complete run executes when no spawn fails: the root plus
    /// `width` children for each unit of countdown.
    pub fn total_bodies(countdown: usize, width: usize) -> usize {
        1 + countdown * width
    }

    // Only succeeds while the countdown is above zero, so the number of
    // branching bodies is exactly the initial countdown.
    fn take_one(&self) -> bool {
        self.countdown
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Body of one fan-out step. Spawns its children through `tracker` and
/// returns without waiting for them.
pub fn fan_out<T: Track>((tracker, plan): (T, Arc<FanOut>)) {
    plan.executed.fetch_add(1, Ordering::AcqRel);

    if let Some(delay) = plan.delay {
        thread::sleep(delay);
    }

    if !plan.take_one() {
        return;
    }

    for _ in 0..plan.width {
        let child = (tracker.clone(), Arc::clone(&plan));
        if let Err(e) = tracker.spawn(fan_out::<T>, child) {
            plan.spawn_failures.fetch_add(1, Ordering::AcqRel);
            warn!(error = %e, "fan-out child failed to spawn");
        }
    }
}

/// Spawns the root of a fan-out run through `tracker`.
pub fn spawn_fan_out<T: Track>(
    tracker: &T,
    plan: Arc<FanOut>,
) -> Result<TaskHandle<()>, SpawnError> {
    tracker.spawn(fan_out::<T>, (tracker.clone(), plan))
}

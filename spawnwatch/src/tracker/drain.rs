use crate::tracker::Track;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// What it took for a tracker to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Number of times the live count was read, the final zero included.
    pub polls: usize,

    /// Time spent waiting, startup grace included.
    pub elapsed: Duration,
}

// Polling trades reaction time for an idle supervisor. There is no timeout: a
// spawn chain that never ends never drains.
pub(crate) fn wait_for_drain<T: Track>(tracker: &T) -> DrainReport {
    let cfg = tracker.config();
    let start = Instant::now();

    if !cfg.startup_grace.is_zero() {
        thread::sleep(cfg.startup_grace);
    }

    let mut polls = 0;
    loop {
        polls += 1;

        let live = tracker.live_count();
        if live == 0 {
            break;
        }

        info!(live, "waiting for tracked threads to finish");
        thread::sleep(cfg.poll_interval);
    }

    let report = DrainReport {
        polls,
        elapsed: start.elapsed(),
    };
    debug!(polls, elapsed = ?report.elapsed, "tracked threads drained");

    report
}

//! Cooperative cancellation and wall-clock watchdog.
//!
//! The search is single-threaded and polls a shared stop flag at
//! well-defined suspension points; nothing is ever interrupted mid-move.
//! The [`Watchdog`] runs on its own thread, sets the flag when the deadline
//! passes, and fires an emergency callback a grace period later if the
//! search still has not wound down. Requesting a stop is not an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Polling interval of the watchdog thread.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared cooperative stop flag.
///
/// Cloning yields another handle to the same flag; the only cross-thread
/// state in the whole system.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Creates a fresh, unset handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cooperative termination.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns true once termination has been requested.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Wall-clock watchdog with a two-stage shutdown.
///
/// Stage one: after `timeout` the stop handle is set and the search is
/// expected to exit cooperatively. Stage two: if [`Watchdog::disarm`] has
/// not been called within a further `grace`, the emergency callback runs
/// (typically: write the best placement found so far and exit).
pub struct Watchdog {
    stop: StopHandle,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawns the watchdog thread.
    pub fn spawn<F>(timeout: Duration, grace: Duration, emergency: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let stop = StopHandle::new();
        let finished = Arc::new(AtomicBool::new(false));

        let stop_clone = stop.clone();
        let finished_clone = Arc::clone(&finished);
        let thread = thread::spawn(move || {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if finished_clone.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }

            log::warn!("watchdog: timeout reached, requesting cooperative stop");
            stop_clone.request();

            let grace_deadline = Instant::now() + grace;
            while Instant::now() < grace_deadline {
                if finished_clone.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }

            if finished_clone.load(Ordering::Relaxed) {
                return;
            }
            log::warn!("watchdog: grace period elapsed, running emergency shutdown");
            emergency();
        });

        Self {
            stop,
            finished,
            thread: Some(thread),
        }
    }

    /// The stop handle the search should poll.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Marks the search as finished, releasing the watchdog thread and
    /// suppressing the emergency callback.
    pub fn disarm(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

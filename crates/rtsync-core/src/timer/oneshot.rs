//! One worker thread multiplexing delayed one-shot callbacks
//!
//! The worker holds the scheduler mutex except while asleep. Each time it
//! wakes it runs every request whose deadline has passed (in submission
//! order, mutex held), then sleeps on the condition variable until the
//! nearest remaining deadline, or indefinitely when nothing is pending.
//! A new request signals the worker so it can recompute its sleep.
//!
//! Shutdown wakes the worker, joins it and drops whatever is still pending
//! without calling it. Requests cannot be cancelled individually.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::sync::{platform, Condvar, Mutex, Platform, SyncResult, Thread, ThreadPriority};

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Request {
    callback: Callback,
    deadline: Instant,
}

#[derive(Default)]
struct State {
    /// Unordered; the worker scans it on every wake
    pending: Vec<Request>,
    cancelled: bool,
}

struct Shared {
    mutex: Mutex,
    cond: Condvar,
    state: RefCell<State>,
    /// Raw id of the worker thread, 0 until it starts
    worker_id: AtomicU64,
}

// SAFETY: `state` is only borrowed through `Shared::with_state`, which
// requires the calling thread to hold `mutex`. The mutex serialises every
// access, so the RefCell is never touched by two threads at once.
unsafe impl Sync for Shared {}

impl Shared {
    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        debug_assert!(self.mutex.is_held_by_current());
        f(&mut self.state.borrow_mut())
    }
}

/// Runs delayed callbacks on a single dedicated thread
pub struct OneshotScheduler {
    shared: Arc<Shared>,
    worker: std::sync::Mutex<Option<Thread>>,
    platform: Platform,
}

impl OneshotScheduler {
    /// Start a scheduler on the process-wide platform
    pub fn new(priority: ThreadPriority) -> SyncResult<Self> {
        Self::with_platform(platform()?, priority)
    }

    pub fn with_platform(platform: &Platform, priority: ThreadPriority) -> SyncResult<Self> {
        let shared = Arc::new(Shared {
            mutex: Mutex::with_platform(platform)?,
            cond: Condvar::with_platform(platform)?,
            state: RefCell::new(State::default()),
            worker_id: AtomicU64::new(0),
        });

        let worker = {
            let shared = shared.clone();
            let worker_platform = platform.clone();
            Thread::spawn_on(platform, "rtsync-oneshot", move || {
                worker_platform.set_priority(priority);
                shared
                    .worker_id
                    .store(worker_platform.current_thread_id().as_raw(), Ordering::Release);
                run_worker(&shared)
            })?
        };

        log::info!("[ONESHOT] Scheduler started ({:?} priority)", priority);

        Ok(Self {
            shared,
            worker: std::sync::Mutex::new(Some(worker)),
            platform: platform.clone(),
        })
    }

    /// Run `callback` on the worker thread once `delay` has elapsed
    ///
    /// Never early; late by however long the worker is busy with earlier
    /// callbacks. Requests made after shutdown are dropped.
    pub fn schedule<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _guard = self.shared.mutex.lock_guard();
        let accepted = self.shared.with_state(|state| {
            if state.cancelled {
                return false;
            }
            state.pending.push(Request {
                callback: Box::new(callback),
                deadline: Instant::now() + delay,
            });
            true
        });

        if accepted {
            log::debug!("[ONESHOT] Scheduled callback in {:?}", delay);
            self.shared.cond.signal();
        } else {
            log::debug!("[ONESHOT] Scheduler stopped, dropping request");
        }
    }

    /// Number of requests that have not fired yet
    pub fn pending(&self) -> usize {
        let _guard = self.shared.mutex.lock_guard();
        self.shared.with_state(|state| state.pending.len())
    }

    /// Stop the worker and drop pending requests uncalled
    ///
    /// Idempotent. Called from inside a callback it stops the worker but
    /// cannot join it, so the thread is left to exit on its own.
    pub fn shutdown(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        let dropped = {
            let _guard = self.shared.mutex.lock_guard();
            let dropped = self.shared.with_state(|state| {
                state.cancelled = true;
                std::mem::take(&mut state.pending).len()
            });
            self.shared.cond.signal();
            dropped
        };

        let me = self.platform.current_thread_id().as_raw();
        if self.shared.worker_id.load(Ordering::Acquire) == me {
            log::warn!("[ONESHOT] Shutdown requested from a callback, not joining worker");
        } else if let Err(e) = worker.wait() {
            log::error!("[ONESHOT] Worker did not exit cleanly: {}", e);
        }

        log::info!(
            "[ONESHOT] Scheduler stopped ({} pending request(s) dropped)",
            dropped
        );
    }
}

impl Drop for OneshotScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared) -> i32 {
    shared.mutex.lock();

    loop {
        let due = shared.with_state(|state| {
            if state.cancelled {
                return None;
            }
            let now = Instant::now();
            let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|request| request.deadline <= now);
            state.pending = rest;
            Some(due)
        });

        let Some(due) = due else {
            break;
        };

        // Callbacks may schedule more work: the mutex is recursive and the
        // state is not borrowed while they run.
        for request in due {
            if panic::catch_unwind(AssertUnwindSafe(request.callback)).is_err() {
                log::error!("[ONESHOT] Callback panicked");
            }
        }

        let next = shared.with_state(|state| {
            state.pending.iter().map(|request| request.deadline).min()
        });

        let waited = match next {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    continue;
                }
                shared.cond.wait_timeout(&shared.mutex, deadline - now).map(|_| ())
            }
            None => shared.cond.wait(&shared.mutex),
        };

        if let Err(e) = waited {
            log::error!("[ONESHOT] Worker lost its mutex: {}", e);
            return 1;
        }
    }

    // Only reached while holding the mutex
    let _ = shared.mutex.unlock();
    0
}

// ───────────────────────────────────────────────────────────────────────────────
// Process-wide scheduler
// ───────────────────────────────────────────────────────────────────────────────

static ONESHOT: std::sync::Mutex<Option<Arc<OneshotScheduler>>> = std::sync::Mutex::new(None);

fn slot() -> std::sync::MutexGuard<'static, Option<Arc<OneshotScheduler>>> {
    ONESHOT
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Start the process-wide scheduler with a given worker priority
///
/// No-op when it is already running.
pub fn start_oneshot(priority: ThreadPriority) -> SyncResult<()> {
    let mut slot = slot();
    if slot.is_none() {
        *slot = Some(Arc::new(OneshotScheduler::new(priority)?));
    }
    Ok(())
}

/// Call `callback` on the process-wide scheduler after `delay_ms`
///
/// Starts the scheduler on first use. Fails only if its worker thread
/// cannot be created.
pub fn schedule_oneshot<F>(delay_ms: u32, callback: F) -> SyncResult<()>
where
    F: FnOnce() + Send + 'static,
{
    let scheduler = {
        let mut slot = slot();
        match slot.as_ref() {
            Some(scheduler) => scheduler.clone(),
            None => {
                let scheduler = Arc::new(OneshotScheduler::new(ThreadPriority::High)?);
                *slot = Some(scheduler.clone());
                scheduler
            }
        }
    };

    // Not under the slot lock: the worker may be running a callback that
    // itself calls schedule_oneshot.
    scheduler.schedule(Duration::from_millis(u64::from(delay_ms)), callback);
    Ok(())
}

/// Stop the process-wide scheduler, dropping pending requests
pub fn shutdown_oneshot() {
    let scheduler = slot().take();
    if let Some(scheduler) = scheduler {
        scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn platforms() -> Vec<Platform> {
        vec![Platform::native(), Platform::semaphore_only()]
    }

    #[test]
    fn test_earlier_deadline_fires_first() {
        for platform in platforms() {
            let scheduler =
                OneshotScheduler::with_platform(&platform, ThreadPriority::Normal).unwrap();
            let (tx, rx) = mpsc::channel();
            let start = Instant::now();

            let tx_a = tx.clone();
            scheduler.schedule(Duration::from_millis(50), move || {
                tx_a.send(("a", start.elapsed())).unwrap();
            });
            scheduler.schedule(Duration::from_millis(10), move || {
                tx.send(("b", start.elapsed())).unwrap();
            });

            let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(first.0, "b");
            assert_eq!(second.0, "a");
            assert!(first.1 >= Duration::from_millis(10));
            assert!(second.1 >= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_shutdown_drops_pending_uncalled() {
        for platform in platforms() {
            let fired = Arc::new(AtomicUsize::new(0));
            let scheduler =
                OneshotScheduler::with_platform(&platform, ThreadPriority::Normal).unwrap();
            for delay in [10u64, 50] {
                let fired = fired.clone();
                scheduler.schedule(Duration::from_millis(delay), move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                });
            }
            assert_eq!(scheduler.pending(), 2);

            scheduler.shutdown();
            std::thread::sleep(Duration::from_millis(80));
            assert_eq!(fired.load(Ordering::SeqCst), 0);

            // Late requests are refused
            scheduler.schedule(Duration::ZERO, || panic!("must not run"));
            assert_eq!(scheduler.pending(), 0);
        }
    }

    #[test]
    fn test_callback_can_schedule_more() {
        let scheduler = Arc::new(
            OneshotScheduler::with_platform(&Platform::native(), ThreadPriority::Normal).unwrap(),
        );
        let (tx, rx) = mpsc::channel();

        let inner = scheduler.clone();
        scheduler.schedule(Duration::from_millis(5), move || {
            inner.schedule(Duration::from_millis(5), move || {
                tx.send(()).unwrap();
            });
        });

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        scheduler.shutdown();
    }

    #[test]
    fn test_panicking_callback_keeps_worker_alive() {
        let scheduler =
            OneshotScheduler::with_platform(&Platform::native(), ThreadPriority::Normal).unwrap();
        let (tx, rx) = mpsc::channel();
        scheduler.schedule(Duration::ZERO, || panic!("callback failure"));
        scheduler.schedule(Duration::from_millis(10), move || tx.send(()).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }
}

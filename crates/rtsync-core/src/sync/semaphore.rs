//! Counting semaphore
//!
//! Native when the backend has semaphores, otherwise a count guarded by the
//! backend's mutex with a condition variable to sleep on.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use super::backend::{Capabilities, RawCondvar, RawMutex, RawSemaphore};
use super::error::SyncResult;
use super::platform::{platform, Platform};

enum Inner {
    Native(Box<dyn RawSemaphore>),
    Emulated {
        lock: Box<dyn RawMutex>,
        cond: Box<dyn RawCondvar>,
        /// Only touched while `lock` is held
        count: AtomicU32,
    },
}

/// Counting semaphore with `wait` / `post`
///
/// A `post` with nobody waiting is remembered and satisfies the next `wait`.
/// Share it between threads with an `Arc`.
pub struct Semaphore {
    inner: Inner,
}

impl Semaphore {
    /// Create a semaphore on the process-wide platform
    pub fn new(initial: u32) -> SyncResult<Self> {
        Self::with_platform(platform()?, initial)
    }

    pub fn with_platform(platform: &Platform, initial: u32) -> SyncResult<Self> {
        let backend = platform.backend();
        let inner = if backend.capabilities().contains(Capabilities::SEMAPHORE) {
            Inner::Native(backend.create_semaphore(initial)?)
        } else {
            Inner::Emulated {
                lock: backend.create_mutex()?,
                cond: backend.create_condvar()?,
                count: AtomicU32::new(initial),
            }
        };
        Ok(Self { inner })
    }

    /// Block until the count is positive, then decrement it
    pub fn wait(&self) {
        match &self.inner {
            Inner::Native(sem) => sem.wait(),
            Inner::Emulated { lock, cond, count } => {
                lock.lock();
                while count.load(Ordering::Relaxed) == 0 {
                    cond.wait(&mut || lock.unlock(), None);
                    lock.lock();
                }
                count.fetch_sub(1, Ordering::Relaxed);
                lock.unlock();
            }
        }
    }

    /// Like [`Semaphore::wait`], giving up after `timeout`
    ///
    /// Returns `true` if the count was decremented.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match &self.inner {
            Inner::Native(sem) => sem.wait_timeout(timeout),
            Inner::Emulated { lock, cond, count } => {
                let deadline = Instant::now() + timeout;
                lock.lock();
                while count.load(Ordering::Relaxed) == 0 {
                    let now = Instant::now();
                    if now >= deadline {
                        lock.unlock();
                        return false;
                    }
                    cond.wait(&mut || lock.unlock(), Some(deadline - now));
                    lock.lock();
                }
                count.fetch_sub(1, Ordering::Relaxed);
                lock.unlock();
                true
            }
        }
    }

    /// Increment the count and wake at most one waiter
    pub fn post(&self) {
        match &self.inner {
            Inner::Native(sem) => sem.post(),
            Inner::Emulated { lock, cond, count } => {
                lock.lock();
                count.fetch_add(1, Ordering::Relaxed);
                cond.signal();
                lock.unlock();
            }
        }
    }

    /// Whether this semaphore is built from a mutex and condition variable
    pub fn is_emulated(&self) -> bool {
        matches!(self.inner, Inner::Emulated { .. })
    }
}

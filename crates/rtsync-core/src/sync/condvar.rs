//! Condition variable paired with a [`Mutex`]
//!
//! When the backend has no condition variable, one is built from three
//! semaphores and two counters:
//!
//! - `wait_sem` (0): where waiters sleep
//! - `handshake_sem` (0): a woken waiter tells the signaller it has left
//! - `signal_sem` (1): guards `waiters` and `to_signal`
//!
//! A signal posts `wait_sem` only while `waiters > to_signal` and then blocks
//! until the woken waiter answers on `handshake_sem`, so one signal releases
//! exactly one waiter and a signal with nobody waiting is dropped.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::backend::{Capabilities, RawCondvar};
use super::error::SyncResult;
use super::mutex::Mutex;
use super::platform::{platform, Platform};
use super::semaphore::Semaphore;

struct Handshake {
    wait_sem: Semaphore,
    handshake_sem: Semaphore,
    signal_sem: Semaphore,
    /// Guarded by `signal_sem`
    waiters: AtomicU32,
    /// Guarded by `signal_sem`
    to_signal: AtomicU32,
}

impl Handshake {
    fn new(platform: &Platform) -> SyncResult<Self> {
        Ok(Self {
            wait_sem: Semaphore::with_platform(platform, 0)?,
            handshake_sem: Semaphore::with_platform(platform, 0)?,
            signal_sem: Semaphore::with_platform(platform, 1)?,
            waiters: AtomicU32::new(0),
            to_signal: AtomicU32::new(0),
        })
    }

    fn signal(&self) {
        self.signal_sem.wait();
        let waiters = self.waiters.load(Ordering::Relaxed);
        let to_signal = self.to_signal.load(Ordering::Relaxed);

        if waiters > to_signal {
            self.to_signal.fetch_add(1, Ordering::Relaxed);
            self.wait_sem.post();
            self.signal_sem.post();
            self.handshake_sem.wait();
        } else {
            self.signal_sem.post();
        }
    }

    fn wait(&self, release: &mut dyn FnMut(), timeout: Option<Duration>) -> bool {
        self.signal_sem.wait();
        self.waiters.fetch_add(1, Ordering::Relaxed);
        self.signal_sem.post();

        release();

        let woken = match timeout {
            Some(timeout) => self.wait_sem.wait_timeout(timeout),
            None => {
                self.wait_sem.wait();
                true
            }
        };

        // A waiter that timed out while a signal was in flight still answers
        // the handshake; the signaller's wait_sem token stays for a later waiter.
        self.signal_sem.wait();
        if self.to_signal.load(Ordering::Relaxed) > 0 {
            self.handshake_sem.post();
            self.to_signal.fetch_sub(1, Ordering::Relaxed);
        }
        self.waiters.fetch_sub(1, Ordering::Relaxed);
        self.signal_sem.post();

        woken
    }
}

enum Inner {
    Native(Box<dyn RawCondvar>),
    Emulated(Handshake),
}

/// Wait / signal on a condition guarded by a [`Mutex`]
///
/// `signal` wakes at most one waiter; there is no broadcast and no FIFO
/// guarantee. Callers re-check their predicate after waking.
pub struct Condvar {
    inner: Inner,
}

impl Condvar {
    /// Create a condition variable on the process-wide platform
    pub fn new() -> SyncResult<Self> {
        Self::with_platform(platform()?)
    }

    pub fn with_platform(platform: &Platform) -> SyncResult<Self> {
        let backend = platform.backend();
        let inner = if backend.capabilities().contains(Capabilities::CONDVAR) {
            Inner::Native(backend.create_condvar()?)
        } else {
            Inner::Emulated(Handshake::new(platform)?)
        };
        Ok(Self { inner })
    }

    /// Wake one waiter, if any
    pub fn signal(&self) {
        match &self.inner {
            Inner::Native(cv) => cv.signal(),
            Inner::Emulated(hs) => hs.signal(),
        }
    }

    /// Release `mutex`, sleep until signalled, then reacquire it
    ///
    /// The calling thread must hold `mutex`. Recursive ownership is released
    /// completely and restored to the same depth before returning.
    pub fn wait(&self, mutex: &Mutex) -> SyncResult<()> {
        self.wait_inner(mutex, None).map(|_| ())
    }

    /// Like [`Condvar::wait`] with an upper bound on the sleep
    ///
    /// Returns `Ok(true)` when woken by a signal and `Ok(false)` on timeout.
    /// The mutex is held again in both cases.
    pub fn wait_timeout(&self, mutex: &Mutex, timeout: Duration) -> SyncResult<bool> {
        self.wait_inner(mutex, Some(timeout))
    }

    fn wait_inner(&self, mutex: &Mutex, timeout: Option<Duration>) -> SyncResult<bool> {
        let depth = mutex.owned_depth()?;
        let mut release = || mutex.release_all();

        let woken = match &self.inner {
            Inner::Native(cv) => cv.wait(&mut release, timeout),
            Inner::Emulated(hs) => hs.wait(&mut release, timeout),
        };

        mutex.reacquire(depth);
        Ok(woken)
    }

    /// Whether this is the semaphore handshake rather than a native condvar
    pub fn is_emulated(&self) -> bool {
        matches!(self.inner, Inner::Emulated(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncError;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn platforms() -> Vec<Platform> {
        vec![Platform::native(), Platform::semaphore_only()]
    }

    #[test]
    fn test_wait_without_owning_mutex_is_refused() {
        for platform in platforms() {
            let mutex = Mutex::with_platform(&platform).unwrap();
            let cv = Condvar::with_platform(&platform).unwrap();
            assert_eq!(cv.wait(&mutex), Err(SyncError::NotOwner));
        }
    }

    #[test]
    fn test_timeout_reacquires_mutex() {
        for platform in platforms() {
            let mutex = Mutex::with_platform(&platform).unwrap();
            let cv = Condvar::with_platform(&platform).unwrap();

            mutex.lock();
            let start = Instant::now();
            let woken = cv.wait_timeout(&mutex, Duration::from_millis(20)).unwrap();
            assert!(!woken);
            assert!(start.elapsed() >= Duration::from_millis(20));
            assert!(mutex.is_held_by_current());
            mutex.unlock().unwrap();
        }
    }

    #[test]
    fn test_recursive_depth_is_restored() {
        for platform in platforms() {
            let mutex = Mutex::with_platform(&platform).unwrap();
            let cv = Condvar::with_platform(&platform).unwrap();

            mutex.lock();
            mutex.lock();
            cv.wait_timeout(&mutex, Duration::from_millis(5)).unwrap();
            mutex.unlock().unwrap();
            assert!(mutex.is_held_by_current());
            mutex.unlock().unwrap();
            assert!(!mutex.is_held_by_current());
        }
    }

    #[test]
    fn test_signal_wakes_predicate_waiter() {
        for platform in platforms() {
            let mutex = Arc::new(Mutex::with_platform(&platform).unwrap());
            let cv = Arc::new(Condvar::with_platform(&platform).unwrap());
            let ready = Arc::new(AtomicBool::new(false));

            let waiter = {
                let (mutex, cv, ready) = (mutex.clone(), cv.clone(), ready.clone());
                thread::spawn(move || {
                    let deadline = Instant::now() + Duration::from_secs(5);
                    mutex.lock();
                    while !ready.load(Ordering::SeqCst) && Instant::now() < deadline {
                        cv.wait_timeout(&mutex, Duration::from_millis(100)).unwrap();
                    }
                    mutex.unlock().unwrap();
                    ready.load(Ordering::SeqCst)
                })
            };

            thread::sleep(Duration::from_millis(20));
            mutex.lock();
            ready.store(true, Ordering::SeqCst);
            cv.signal();
            mutex.unlock().unwrap();

            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_no_missed_wakeup_after_release() {
        for platform in platforms() {
            let mutex = Arc::new(Mutex::with_platform(&platform).unwrap());
            let cv = Arc::new(Condvar::with_platform(&platform).unwrap());
            let released = Arc::new(AtomicBool::new(false));

            let waiter = {
                let (mutex, cv, released) = (mutex.clone(), cv.clone(), released.clone());
                thread::spawn(move || {
                    mutex.lock();
                    // Stall between dropping the mutex and blocking
                    let mut release = || {
                        mutex.release_all();
                        released.store(true, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                    };
                    let woken = match &cv.inner {
                        Inner::Native(raw) => raw.wait(&mut release, Some(Duration::from_secs(5))),
                        Inner::Emulated(hs) => hs.wait(&mut release, Some(Duration::from_secs(5))),
                    };
                    mutex.reacquire(1);
                    mutex.unlock().unwrap();
                    woken
                })
            };

            while !released.load(Ordering::SeqCst) {
                thread::yield_now();
            }
            mutex.lock();
            cv.signal();
            mutex.unlock().unwrap();

            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_emulated_on_semaphore_only_backend() {
        assert!(Condvar::with_platform(&Platform::semaphore_only())
            .unwrap()
            .is_emulated());
        assert!(!Condvar::with_platform(&Platform::native())
            .unwrap()
            .is_emulated());
    }
}

//! Recursive, ownership-aware mutex
//!
//! The lock underneath is either the backend's plain mutex or a binary
//! [`Semaphore`]. Either way this type records the owning thread and a
//! reentry count, so the owner may lock again without deadlocking and a
//! stray `unlock` from another thread is refused instead of corrupting state.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::backend::{Capabilities, RawMutex};
use super::error::{SyncError, SyncResult};
use super::platform::{platform, Platform};
use super::semaphore::Semaphore;

/// Owner value when nobody holds the lock
const UNOWNED: u64 = 0;

enum Lock {
    Native(Box<dyn RawMutex>),
    Emulated(Semaphore),
}

impl Lock {
    fn acquire(&self) {
        match self {
            Lock::Native(raw) => raw.lock(),
            Lock::Emulated(sem) => sem.wait(),
        }
    }

    fn release(&self) {
        match self {
            Lock::Native(raw) => raw.unlock(),
            Lock::Emulated(sem) => sem.post(),
        }
    }
}

/// Exclusive lock that the owning thread may take recursively
///
/// Unlike [`std::sync::Mutex`] this does not wrap data; it guards whatever
/// the caller decides it guards, which is what the audio bridge and the
/// oneshot scheduler need. Dropping it is deleting it.
pub struct Mutex {
    platform: Platform,
    lock: Lock,
    /// Raw [`super::ThreadId`] of the holder, or [`UNOWNED`]
    owner: AtomicU64,
    /// Reentry depth, non-zero only while owned
    depth: AtomicU32,
}

impl Mutex {
    /// Create a mutex on the process-wide platform
    pub fn new() -> SyncResult<Self> {
        Self::with_platform(platform()?)
    }

    pub fn with_platform(platform: &Platform) -> SyncResult<Self> {
        let backend = platform.backend();
        let lock = if backend.capabilities().contains(Capabilities::MUTEX) {
            Lock::Native(backend.create_mutex()?)
        } else {
            Lock::Emulated(Semaphore::with_platform(platform, 1)?)
        };

        Ok(Self {
            platform: platform.clone(),
            lock,
            owner: AtomicU64::new(UNOWNED),
            depth: AtomicU32::new(0),
        })
    }

    fn current(&self) -> u64 {
        self.platform.current_thread_id().as_raw()
    }

    /// Acquire the lock, or bump the reentry count if we already hold it
    pub fn lock(&self) {
        let me = self.current();
        if self.owner.load(Ordering::Relaxed) == me {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.lock.acquire();
        self.owner.store(me, Ordering::Relaxed);
        self.depth.store(1, Ordering::Relaxed);
    }

    /// Release one level of ownership
    ///
    /// A thread that does not hold the lock gets [`SyncError::NotOwner`] and
    /// the lock is left untouched.
    pub fn unlock(&self) -> SyncResult<()> {
        self.owned_depth()?;

        if self.depth.load(Ordering::Relaxed) > 1 {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        } else {
            self.depth.store(0, Ordering::Relaxed);
            self.owner.store(UNOWNED, Ordering::Relaxed);
            self.lock.release();
        }
        Ok(())
    }

    /// Lock and return a guard that unlocks when dropped
    pub fn lock_guard(&self) -> MutexGuard<'_> {
        self.lock();
        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// Whether the calling thread holds this mutex
    pub fn is_held_by_current(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == self.current()
    }

    /// Whether the underlying lock is a binary semaphore
    pub fn is_emulated(&self) -> bool {
        matches!(self.lock, Lock::Emulated(_))
    }

    /// Reentry depth held by the calling thread, or `NotOwner`
    pub(crate) fn owned_depth(&self) -> SyncResult<u32> {
        if self.is_held_by_current() {
            Ok(self.depth.load(Ordering::Relaxed))
        } else {
            log::warn!("[SYNC] Mutex released by thread that does not own it");
            Err(SyncError::NotOwner)
        }
    }

    /// Drop every level of ownership at once. Caller must be the owner.
    pub(crate) fn release_all(&self) {
        self.depth.store(0, Ordering::Relaxed);
        self.owner.store(UNOWNED, Ordering::Relaxed);
        self.lock.release();
    }

    /// Reacquire and restore a depth saved before [`Mutex::release_all`]
    pub(crate) fn reacquire(&self, depth: u32) {
        self.lock.acquire();
        self.owner.store(self.current(), Ordering::Relaxed);
        self.depth.store(depth.max(1), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("owner", &self.owner.load(Ordering::Relaxed))
            .field("depth", &self.depth.load(Ordering::Relaxed))
            .field("emulated", &self.is_emulated())
            .finish()
    }
}

/// Scoped ownership of a [`Mutex`]
///
/// Must be dropped on the thread that created it.
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    _not_send: PhantomData<*const ()>,
}

impl MutexGuard<'_> {
    pub fn mutex(&self) -> &Mutex {
        self.mutex
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        // Cannot fail: the guard is only created by the owner and is !Send
        let _ = self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn platforms() -> Vec<Platform> {
        vec![Platform::native(), Platform::semaphore_only()]
    }

    #[test]
    fn test_emulated_on_semaphore_only_backend() {
        assert!(Mutex::with_platform(&Platform::semaphore_only())
            .unwrap()
            .is_emulated());
        assert!(!Mutex::with_platform(&Platform::native())
            .unwrap()
            .is_emulated());
    }

    #[test]
    fn test_recursive_lock_needs_matching_unlocks() {
        for platform in platforms() {
            let mutex = Arc::new(Mutex::with_platform(&platform).unwrap());
            mutex.lock();
            mutex.lock();
            mutex.lock();
            mutex.unlock().unwrap();
            mutex.unlock().unwrap();

            // Still held once: another thread must not get in
            let m = mutex.clone();
            let probe = thread::spawn(move || {
                m.lock();
                m.unlock().unwrap();
            });
            thread::sleep(Duration::from_millis(30));
            assert!(!probe.is_finished());

            mutex.unlock().unwrap();
            probe.join().unwrap();
            assert!(!mutex.is_held_by_current());
        }
    }

    #[test]
    fn test_unlock_by_non_owner_is_refused() {
        for platform in platforms() {
            let mutex = Arc::new(Mutex::with_platform(&platform).unwrap());
            assert_eq!(mutex.unlock(), Err(SyncError::NotOwner));

            mutex.lock();
            let m = mutex.clone();
            let result = thread::spawn(move || m.unlock()).join().unwrap();
            assert_eq!(result, Err(SyncError::NotOwner));
            assert!(mutex.is_held_by_current());
            mutex.unlock().unwrap();
        }
    }

    #[test]
    fn test_guard_releases_on_drop() {
        for platform in platforms() {
            let mutex = Mutex::with_platform(&platform).unwrap();
            {
                let guard = mutex.lock_guard();
                assert!(guard.mutex().is_held_by_current());
                let _inner = mutex.lock_guard();
            }
            assert!(!mutex.is_held_by_current());
        }
    }
}

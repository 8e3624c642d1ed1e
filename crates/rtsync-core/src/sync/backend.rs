//! Threading backend trait for platform-specific implementations
//!
//! A backend is the thin adapter between this layer and whatever the host
//! offers. It always provides threads, and then some subset of:
//! - **Semaphores**: counting semaphores
//! - **Mutexes**: a plain, non-recursive exclusive lock
//! - **Condition variables**: usable with an arbitrary mutex
//!
//! The subset is declared with [`Capabilities`]. Anything missing is emulated
//! by the portable primitives in this module ([`super::Mutex`],
//! [`super::Condvar`], [`super::Semaphore`]) on top of what *is* there. A valid
//! backend provides either semaphores, or mutexes and condition variables.
//!
//! # Important
//!
//! This file must NOT contain any OS-specific code. Implementations live in
//! their own files and are selected once, at startup, by [`super::Platform`].

use std::num::NonZeroU64;
use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::error::SyncResult;

bitflags! {
    /// Primitives a backend supplies natively
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const MUTEX = 1 << 0;
        const SEMAPHORE = 1 << 1;
        const CONDVAR = 1 << 2;
    }
}

impl Capabilities {
    /// Whether the portable layer can build every primitive from this set
    pub fn is_complete(self) -> bool {
        self.contains(Capabilities::SEMAPHORE)
            || self.contains(Capabilities::MUTEX | Capabilities::CONDVAR)
    }
}

/// Opaque identifier of an OS thread
///
/// Only meaningful for equality. Zero is reserved for "no owner", so a valid
/// id is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    pub(crate) fn from_raw(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    pub(crate) fn as_raw(self) -> u64 {
        self.0.get()
    }
}

/// Scheduling hint applied to the calling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPriority {
    Low,
    #[default]
    Normal,
    High,
    TimeCritical,
}

/// Counting semaphore provided by a backend
pub trait RawSemaphore: Send + Sync {
    /// Block until the count is positive, then decrement it
    fn wait(&self);

    /// Like [`RawSemaphore::wait`], giving up after `timeout`
    ///
    /// Returns `true` if the count was decremented.
    fn wait_timeout(&self, timeout: Duration) -> bool;

    /// Increment the count, waking at most one waiter
    fn post(&self);
}

/// Non-recursive exclusive lock provided by a backend
///
/// Ownership and recursion are tracked by [`super::Mutex`]; `unlock` is only
/// ever called by the thread that called `lock`.
pub trait RawMutex: Send + Sync {
    fn lock(&self);
    fn unlock(&self);
}

/// Condition variable provided by a backend
///
/// The backend does not know the mutex type it is paired with. Instead,
/// `wait` calls `release` exactly once, *after* the caller has been
/// registered as a waiter, so a signal issued right after the external mutex
/// is dropped can never be missed. Reacquiring is the caller's job.
pub trait RawCondvar: Send + Sync {
    /// Wake at most one registered waiter. No-op when nobody waits.
    fn signal(&self);

    /// Returns `true` if woken by a signal, `false` on timeout
    fn wait(&self, release: &mut dyn FnMut(), timeout: Option<Duration>) -> bool;
}

/// Joinable OS thread
pub trait RawThread: Send {
    /// Block until the thread body returns and yield its status
    fn join(self: Box<Self>) -> SyncResult<i32>;
}

/// Thread body handed to a backend
pub type ThreadBody = Box<dyn FnOnce() -> i32 + Send + 'static>;

mod sealed {
    pub trait Sealed {}
}

pub(crate) use sealed::Sealed;

/// Core threading backend trait
///
/// Sealed: the set of backends is fixed and chosen by [`super::Platform`].
pub trait ThreadsBackend: Sealed + Send + Sync {
    /// Backend name for logs and diagnostics
    fn name(&self) -> &'static str;

    /// Primitives this backend supplies natively
    fn capabilities(&self) -> Capabilities;

    /// Bring the backend up. `false` means "skip me".
    fn init(&self) -> bool {
        true
    }

    /// Tear the backend down at shutdown
    fn quit(&self) {}

    // === Threads ===

    fn spawn(&self, name: &str, body: ThreadBody) -> SyncResult<Box<dyn RawThread>>;

    /// Apply a priority hint to the *calling* thread; unsupported hints are ignored
    fn set_priority(&self, priority: ThreadPriority);

    fn current_thread_id(&self) -> ThreadId;

    // === Primitives (only called when the matching capability is set) ===

    fn create_semaphore(&self, initial: u32) -> SyncResult<Box<dyn RawSemaphore>>;

    fn create_mutex(&self) -> SyncResult<Box<dyn RawMutex>>;

    fn create_condvar(&self) -> SyncResult<Box<dyn RawCondvar>>;
}

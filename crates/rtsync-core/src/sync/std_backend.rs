//! Backend built on the Rust standard library's OS threads and locks
//!
//! One implementation serves three capability profiles, so that the emulated
//! paths can be selected (and tested) on any host:
//!
//! - **native**: semaphores, mutexes and condition variables
//! - **semaphore_only**: semaphores only (mutex and condvar are emulated)
//! - **lock_only**: mutexes and condition variables only (semaphore is emulated)

use std::cell::Cell;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::backend::{
    Capabilities, RawCondvar, RawMutex, RawSemaphore, RawThread, Sealed, ThreadBody, ThreadId,
    ThreadPriority, ThreadsBackend,
};
use super::error::{SyncError, SyncResult};
use super::priority::apply_priority;

/// Next thread id to hand out (zero is "unowned")
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

fn current_id() -> ThreadId {
    THREAD_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        // Never zero: the counter starts at 1 and only grows
        ThreadId::from_raw(NonZeroU64::new(id.get()).unwrap_or(NonZeroU64::MIN))
    })
}

/// No user code runs while these internal locks are held, so a poisoned
/// lock still protects consistent state.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Standard-library backend with a configurable capability profile
pub struct StdBackend {
    name: &'static str,
    capabilities: Capabilities,
}

impl StdBackend {
    /// Everything native
    pub fn native() -> Self {
        Self {
            name: "native",
            capabilities: Capabilities::all(),
        }
    }

    /// Threads and semaphores only, like hosts without a lock API
    pub fn semaphore_only() -> Self {
        Self {
            name: "semaphore_only",
            capabilities: Capabilities::SEMAPHORE,
        }
    }

    /// Threads, mutexes and condition variables, but no semaphore
    pub fn lock_only() -> Self {
        Self {
            name: "lock_only",
            capabilities: Capabilities::MUTEX | Capabilities::CONDVAR,
        }
    }

    fn unsupported(&self, primitive: &'static str) -> SyncError {
        SyncError::Unsupported {
            backend: self.name,
            primitive,
        }
    }
}

impl Sealed for StdBackend {}

impl ThreadsBackend for StdBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn spawn(&self, name: &str, body: ThreadBody) -> SyncResult<Box<dyn RawThread>> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| SyncError::ThreadCreate {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(StdThread {
            name: name.to_string(),
            handle,
        }))
    }

    fn set_priority(&self, priority: ThreadPriority) {
        apply_priority(priority);
    }

    fn current_thread_id(&self) -> ThreadId {
        current_id()
    }

    fn create_semaphore(&self, initial: u32) -> SyncResult<Box<dyn RawSemaphore>> {
        if !self.capabilities.contains(Capabilities::SEMAPHORE) {
            return Err(self.unsupported("semaphores"));
        }
        Ok(Box::new(StdSemaphore {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }))
    }

    fn create_mutex(&self) -> SyncResult<Box<dyn RawMutex>> {
        if !self.capabilities.contains(Capabilities::MUTEX) {
            return Err(self.unsupported("mutexes"));
        }
        Ok(Box::new(StdMutex {
            locked: Mutex::new(false),
            released: Condvar::new(),
        }))
    }

    fn create_condvar(&self) -> SyncResult<Box<dyn RawCondvar>> {
        if !self.capabilities.contains(Capabilities::CONDVAR) {
            return Err(self.unsupported("condition variables"));
        }
        Ok(Box::new(StdCondvar {
            state: Mutex::new(CondState::default()),
            wake: Condvar::new(),
        }))
    }
}

// ───────────────────────────────────────────────────────────────────────────────
// Threads
// ───────────────────────────────────────────────────────────────────────────────

struct StdThread {
    name: String,
    handle: JoinHandle<i32>,
}

impl RawThread for StdThread {
    fn join(self: Box<Self>) -> SyncResult<i32> {
        let StdThread { name, handle } = *self;
        handle.join().map_err(|_| SyncError::ThreadPanicked(name))
    }
}

// ───────────────────────────────────────────────────────────────────────────────
// Semaphore
// ───────────────────────────────────────────────────────────────────────────────

struct StdSemaphore {
    count: Mutex<u32>,
    available: Condvar,
}

impl RawSemaphore for StdSemaphore {
    fn wait(&self) {
        let mut count = lock(&self.count);
        while *count == 0 {
            count = self
                .available
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = lock(&self.count);
        while *count == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = self
                .available
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *count -= 1;
        true
    }

    fn post(&self) {
        let mut count = lock(&self.count);
        *count = count.saturating_add(1);
        self.available.notify_one();
    }
}

// ───────────────────────────────────────────────────────────────────────────────
// Mutex
// ───────────────────────────────────────────────────────────────────────────────

/// Guard-less lock: a flag plus a queue of threads waiting for it to clear
struct StdMutex {
    locked: Mutex<bool>,
    released: Condvar,
}

impl RawMutex for StdMutex {
    fn lock(&self) {
        let mut locked = lock(&self.locked);
        while *locked {
            locked = self
                .released
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
    }

    fn unlock(&self) {
        *lock(&self.locked) = false;
        self.released.notify_one();
    }
}

// ───────────────────────────────────────────────────────────────────────────────
// Condition variable
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CondState {
    /// Threads registered in `wait`
    waiters: u32,
    /// Wakeups issued but not yet consumed
    tokens: u32,
}

struct StdCondvar {
    state: Mutex<CondState>,
    wake: Condvar,
}

impl RawCondvar for StdCondvar {
    fn signal(&self) {
        let mut state = lock(&self.state);
        if state.waiters > state.tokens {
            state.tokens += 1;
            self.wake.notify_one();
        }
    }

    fn wait(&self, release: &mut dyn FnMut(), timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut state = lock(&self.state);
        state.waiters += 1;
        // Registered under the internal lock, so releasing the caller's mutex
        // here cannot lose a signal.
        release();

        loop {
            if state.tokens > 0 {
                state.tokens -= 1;
                state.waiters -= 1;
                return true;
            }

            state = match deadline {
                None => self
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.waiters -= 1;
                        return false;
                    }
                    self.wake
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

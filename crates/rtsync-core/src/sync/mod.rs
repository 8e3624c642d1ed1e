//! Portable threads and synchronization primitives
//!
//! Everything here runs on top of a [`ThreadsBackend`] that may supply only
//! part of the usual toolkit. Missing pieces are emulated:
//!
//! | Backend provides     | Mutex            | Condvar               | Semaphore            |
//! |----------------------|------------------|-----------------------|----------------------|
//! | everything           | native           | native                | native               |
//! | semaphores only      | binary semaphore | 3-semaphore handshake | native               |
//! | mutex + condvar only | native           | native                | count + mutex + cond |
//!
//! Every [`Mutex`] is recursive for its owner and refuses unlocks from other
//! threads, whichever lock sits underneath.
//!
//! # Usage
//!
//! ```ignore
//! use rtsync_core::sync::{Condvar, Mutex, Thread};
//!
//! let mutex = Mutex::new()?;
//! let cond = Condvar::new()?;
//!
//! mutex.lock();
//! while !ready() {
//!     cond.wait(&mutex)?;
//! }
//! mutex.unlock()?;
//! ```

mod backend;
mod condvar;
mod error;
mod mutex;
mod platform;
mod priority;
mod semaphore;
mod std_backend;
mod thread;

pub use backend::{
    Capabilities, RawCondvar, RawMutex, RawSemaphore, RawThread, ThreadBody, ThreadId,
    ThreadPriority, ThreadsBackend,
};
pub use condvar::Condvar;
pub use error::{SyncError, SyncResult};
pub use mutex::{Mutex, MutexGuard};
pub use platform::{init, platform, Platform};
pub use semaphore::Semaphore;
pub use thread::{current_id, set_priority, Thread};

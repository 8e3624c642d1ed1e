//! Joinable threads with a name, a status code and a priority hint

use super::backend::{RawThread, ThreadId, ThreadPriority};
use super::error::SyncResult;
use super::platform::{platform, Platform};

/// Handle to a running OS thread
///
/// The body's `i32` return value is the thread's status, collected with
/// [`Thread::wait`]. A thread that is never waited on is detached when the
/// handle is dropped.
pub struct Thread {
    name: String,
    raw: Box<dyn RawThread>,
}

impl Thread {
    /// Spawn `body` on a new thread of the process-wide platform
    pub fn spawn<F>(name: &str, body: F) -> SyncResult<Self>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        Self::spawn_on(platform()?, name, body)
    }

    pub fn spawn_on<F>(platform: &Platform, name: &str, body: F) -> SyncResult<Self>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        let raw = platform.backend().spawn(name, Box::new(body))?;
        log::debug!("[SYNC] Spawned thread '{}' on {}", name, platform.name());
        Ok(Self {
            name: name.to_string(),
            raw,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the thread finishes and return its status
    pub fn wait(self) -> SyncResult<i32> {
        let name = self.name;
        let status = self.raw.join()?;
        log::debug!("[SYNC] Thread '{}' exited with status {}", name, status);
        Ok(status)
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread").field("name", &self.name).finish()
    }
}

/// Apply a priority hint to the calling thread
///
/// Hints the host cannot honour are ignored.
pub fn set_priority(priority: ThreadPriority) {
    match platform() {
        Ok(platform) => platform.set_priority(priority),
        Err(e) => log::debug!("[SYNC] Priority {:?} not applied: {}", priority, e),
    }
}

/// Identifier of the calling thread
pub fn current_id() -> SyncResult<ThreadId> {
    Ok(platform()?.current_thread_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncError;

    #[test]
    fn test_wait_returns_body_status() {
        let thread = Thread::spawn_on(&Platform::native(), "worker", || 42).unwrap();
        assert_eq!(thread.name(), "worker");
        assert_eq!(thread.wait(), Ok(42));
    }

    #[test]
    fn test_panicking_body_is_reported() {
        let thread = Thread::spawn_on(&Platform::native(), "doomed", || panic!("boom")).unwrap();
        assert_eq!(
            thread.wait(),
            Err(SyncError::ThreadPanicked("doomed".to_string()))
        );
    }

    #[test]
    fn test_current_id_differs_per_thread() {
        let main = current_id().unwrap();
        let other = Thread::spawn("id", move || {
            let id = current_id().unwrap();
            i32::from(id != main)
        })
        .unwrap();
        assert_eq!(other.wait(), Ok(1));
    }

    #[test]
    fn test_priority_hint_never_fails() {
        let thread = Thread::spawn("prio", || {
            set_priority(ThreadPriority::Low);
            set_priority(ThreadPriority::TimeCritical);
            0
        })
        .unwrap();
        assert_eq!(thread.wait(), Ok(0));
    }
}

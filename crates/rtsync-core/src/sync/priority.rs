//! Best-effort thread priority hints
//!
//! Mapping on unix:
//! - Low / Normal / High adjust the nice value of the calling thread
//! - TimeCritical asks for SCHED_FIFO, which usually needs privileges
//!
//! Failures are logged and otherwise ignored. On other hosts this is a no-op.

use super::backend::ThreadPriority;

#[cfg(unix)]
pub(crate) fn apply_priority(priority: ThreadPriority) {
    let nice = match priority {
        ThreadPriority::Low => 10,
        ThreadPriority::Normal => 0,
        ThreadPriority::High => -5,
        ThreadPriority::TimeCritical => return apply_realtime(),
    };

    // On Linux PRIO_PROCESS with who = 0 targets the calling thread.
    // SAFETY: setpriority has no memory-safety preconditions
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if rc != 0 {
        log::debug!(
            "[SYNC] setpriority({}) failed for {:?}: {}",
            nice,
            priority,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(unix)]
fn apply_realtime() {
    // SAFETY: sched_param is plain old data, all-zero is a valid value
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    // SAFETY: querying the priority range has no preconditions
    param.sched_priority = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };

    // SAFETY: pthread_self is always valid for the calling thread and `param`
    // outlives the call
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc != 0 {
        log::debug!(
            "[SYNC] SCHED_FIFO unavailable ({}), keeping default policy",
            std::io::Error::from_raw_os_error(rc)
        );
    }
}

#[cfg(not(unix))]
pub(crate) fn apply_priority(priority: ThreadPriority) {
    log::debug!("[SYNC] Priority {:?} ignored on this platform", priority);
}

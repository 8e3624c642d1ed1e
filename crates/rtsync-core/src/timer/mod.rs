//! Monotonic time and deferred callbacks
//!
//! - [`ticks_us`], [`usleep`], [`msleep`]: plain timing helpers
//! - [`OneshotScheduler`]: one sleeping worker thread that runs "call this
//!   after N milliseconds" requests
//! - [`schedule_oneshot`] / [`shutdown_oneshot`]: a lazily started
//!   process-wide scheduler

mod oneshot;

pub use oneshot::{schedule_oneshot, shutdown_oneshot, start_oneshot, OneshotScheduler};

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds since the first call, from a monotonic clock
pub fn ticks_us() -> u64 {
    let elapsed = EPOCH.get_or_init(Instant::now).elapsed();
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

pub fn usleep(us: u64) {
    std::thread::sleep(Duration::from_micros(us));
}

pub fn msleep(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}

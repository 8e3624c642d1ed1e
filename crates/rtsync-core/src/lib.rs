//! rtsync Core - Portable synchronization and deferred callbacks
//!
//! - [`sync`]: threads, recursive mutexes, counting semaphores and condition
//!   variables on backends that may lack some of them
//! - [`timer`]: monotonic ticks and the oneshot scheduler
//! - [`config`]: the `threads` settings section and YAML helpers

pub mod config;
pub mod sync;
pub mod timer;

use config::ThreadsConfig;
use sync::{Platform, SyncResult};

/// Install the threading backend and start the oneshot scheduler
///
/// Optional: everything also starts lazily with default settings.
pub fn init(config: &ThreadsConfig) -> SyncResult<&'static Platform> {
    let platform = sync::init(config.backend)?;
    timer::start_oneshot(config.scheduler_priority)?;
    Ok(platform)
}

/// Stop the oneshot scheduler
pub fn shutdown() {
    timer::shutdown_oneshot();
}

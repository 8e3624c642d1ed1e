//! Settings for the synchronization layer
//!
//! The application shell owns the settings file; this module only defines
//! the `threads` section and the generic YAML helpers shared with
//! `rtsync-audio`.
//!
//! ```yaml
//! threads:
//!   backend: auto
//!   scheduler_priority: high
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};

use serde::{Deserialize, Serialize};

use crate::sync::ThreadPriority;

/// Which threading backend to install at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Best backend that passes the startup probe
    #[default]
    Auto,
    Native,
    /// Emulate mutexes and condition variables from semaphores
    SemaphoreOnly,
    /// Emulate semaphores from a mutex and condition variable
    LockOnly,
}

/// Threading section of the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadsConfig {
    pub backend: BackendKind,
    /// Priority hint for the oneshot scheduler's worker
    pub scheduler_priority: ThreadPriority,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            scheduler_priority: ThreadPriority::High,
        }
    }
}

impl ThreadsConfig {
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_scheduler_priority(mut self, priority: ThreadPriority) -> Self {
        self.scheduler_priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: ThreadsConfig = serde_yaml::from_str("backend: semaphore_only\n").unwrap();
        assert_eq!(config.backend, BackendKind::SemaphoreOnly);
        assert_eq!(config.scheduler_priority, ThreadPriority::High);
    }

    #[test]
    fn test_priority_names() {
        let config: ThreadsConfig =
            serde_yaml::from_str("scheduler_priority: time_critical\n").unwrap();
        assert_eq!(config.scheduler_priority, ThreadPriority::TimeCritical);
        assert_eq!(config.backend, BackendKind::Auto);
    }
}

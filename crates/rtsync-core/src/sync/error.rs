//! Synchronization layer error types

use thiserror::Error;

/// Errors that can occur while creating or using threading primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The host could not allocate the primitive
    #[error("Failed to allocate {0}")]
    Allocation(&'static str),

    /// The OS refused to start a thread
    #[error("Failed to create thread '{name}': {reason}")]
    ThreadCreate { name: String, reason: String },

    /// A thread tried to release a mutex it does not hold
    #[error("Mutex unlocked by a thread that does not own it")]
    NotOwner,

    /// The joined thread panicked instead of returning a status
    #[error("Thread '{0}' panicked")]
    ThreadPanicked(String),

    /// The selected backend does not provide this primitive natively
    #[error("Backend '{backend}' does not support {primitive}")]
    Unsupported {
        backend: &'static str,
        primitive: &'static str,
    },

    /// No threading backend passed the startup probe
    #[error("No usable threading backend")]
    NoBackend,
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

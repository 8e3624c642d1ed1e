//! Audio bridge error types

use rtsync_core::sync::SyncError;
use thiserror::Error;

/// Errors that can occur while opening or driving an audio device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// No driver could open the requested device
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Narrowing ran out of formats before any driver accepted one
    #[error("No supported format found (wanted {0})")]
    FormatUnsupported(String),

    /// A device is already open on this backend
    #[error("An audio device is already open")]
    AlreadyOpen,

    /// The operation does not apply in the device's current state
    #[error("Invalid device state: {0}")]
    InvalidState(String),

    /// Creating or using a synchronization primitive failed
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The driver failed to start or lost its stream
    #[error("Audio stream error: {0}")]
    StreamError(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

//! Audio driver trait for platform-specific implementations
//!
//! A driver knows how to find output devices, agree on a format with one,
//! and then call the [`Renderer`] whenever the hardware wants a buffer:
//! - **dummy**: a timer thread that discards what it renders (always built)
//! - **cpal**: CPAL output streams (`cpal-backend` feature)
//! - **jack**: a JACK client with one port per channel (`jack-backend`, Linux)
//!
//! Drivers never lock anything themselves. All locking happens inside the
//! renderer, and the bridge never holds its mutex while calling a driver.

use crate::bridge::Renderer;
use crate::error::AudioResult;
use crate::spec::{AudioSpec, DriverFormat};

/// Why a driver refused to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Device missing, busy, or the driver's service is not running
    Unavailable(String),
    /// The device exists but cannot play this format; try a narrower one
    BadFormat,
}

/// Output device as reported by a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    /// Whether the driver opens this device when none is named
    pub is_default: bool,
    pub max_channels: u16,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_default {
            write!(f, "{} (default, {}ch)", self.name, self.max_channels)
        } else {
            write!(f, "{} ({}ch)", self.name, self.max_channels)
        }
    }
}

/// One open (or openable) output device
///
/// Lifecycle: `open` (possibly several times while the format is being
/// narrowed) → `start` → `stop`. A driver instance is used for exactly one
/// device and dropped after `stop`.
pub trait AudioDriver: Send {
    /// Driver name for logs and settings
    fn name(&self) -> &'static str;

    /// Output devices this driver can open
    fn devices(&self) -> Vec<DeviceInfo>;

    /// Try to open `device` (or the default device) with `desired`
    ///
    /// The returned format may differ from `desired` where the hardware
    /// dictates it (rate, buffer length, float samples). Return
    /// [`DriverError::BadFormat`] to have the caller retry narrower.
    fn open(&mut self, device: Option<&str>, desired: &AudioSpec)
        -> Result<DriverFormat, DriverError>;

    /// Begin calling `renderer` once per hardware period
    fn start(&mut self, renderer: Renderer) -> AudioResult<()>;

    /// Stop calling the renderer
    ///
    /// Must not return while a render call is still in progress.
    fn stop(&mut self);
}

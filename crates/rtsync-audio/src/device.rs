//! Open audio device handle
//!
//! State machine:
//!
//! ```text
//!   open() ──► Open ──pause(false)──► Running ⇄ Paused
//!   close() or drop, from any state ──► Closed
//! ```
//!
//! `pause(false)` on an open device starts the driver. After that, pausing
//! only flips the silence flag under the bridge mutex; the driver keeps
//! running and keeps asking for buffers.

use std::sync::{Arc, PoisonError};

use rtsync_core::sync::MutexGuard;

use crate::bridge::{Bridge, Renderer};
use crate::driver::AudioDriver;
use crate::error::{AudioError, AudioResult};
use crate::spec::{AudioSpec, DriverFormat};

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Format agreed, driver not started
    Open,
    /// Driver running, fill routine called
    Running,
    /// Driver running, silence rendered
    Paused,
    Closed,
}

struct Control {
    driver: Box<dyn AudioDriver>,
    state: DeviceState,
}

/// Single-device slot owned by [`crate::AudioBackend`]
pub(crate) type DeviceSlot = Arc<std::sync::Mutex<Option<Arc<Bridge>>>>;

/// An open output device
///
/// Dropping it closes it.
pub struct AudioDevice {
    bridge: Arc<Bridge>,
    format: DriverFormat,
    driver_name: &'static str,
    /// Driver and state; never held while taking the bridge mutex inside a render
    control: std::sync::Mutex<Control>,
    slot: DeviceSlot,
}

impl AudioDevice {
    pub(crate) fn new(
        bridge: Arc<Bridge>,
        format: DriverFormat,
        driver: Box<dyn AudioDriver>,
        slot: DeviceSlot,
    ) -> Self {
        Self {
            bridge,
            format,
            driver_name: driver.name(),
            control: std::sync::Mutex::new(Control {
                driver,
                state: DeviceState::Open,
            }),
            slot,
        }
    }

    /// Format obtained from the driver
    pub fn spec(&self) -> AudioSpec {
        self.format.spec
    }

    pub fn format(&self) -> DriverFormat {
        self.format
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver_name
    }

    pub fn state(&self) -> DeviceState {
        self.control().state
    }

    fn control(&self) -> std::sync::MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold off the fill routine
    ///
    /// While locked, the driver's next render call waits. Keep it short.
    pub fn lock(&self) {
        self.bridge.mutex().lock();
    }

    pub fn unlock(&self) -> AudioResult<()> {
        self.bridge.mutex().unlock().map_err(AudioError::from)
    }

    /// Scoped [`AudioDevice::lock`]
    pub fn lock_guard(&self) -> MutexGuard<'_> {
        self.bridge.mutex().lock_guard()
    }

    /// Switch between the fill routine and silence
    ///
    /// The first `pause(false)` starts the driver and is refused while the
    /// calling thread holds the device lock.
    pub fn pause(&self, paused: bool) -> AudioResult<()> {
        {
            let mut control = self.control();
            match control.state {
                DeviceState::Closed => {
                    return Err(AudioError::InvalidState("device is closed".to_string()));
                }
                _ if !paused && self.bridge.has_failed() => {
                    return Err(AudioError::InvalidState(
                        "stream failed, reopen the device".to_string(),
                    ));
                }
                DeviceState::Open if paused => return Ok(()),
                DeviceState::Open => {
                    // The driver may wait for its first render, which needs the lock
                    if self.bridge.mutex().is_held_by_current() {
                        return Err(AudioError::InvalidState(
                            "cannot start the device while holding its lock".to_string(),
                        ));
                    }
                    control.driver.start(Renderer::new(self.bridge.clone()))?;
                    control.state = DeviceState::Running;
                    log::info!("[AUDIO] {} device running ({})", self.driver_name, self.spec());
                    return Ok(());
                }
                DeviceState::Running | DeviceState::Paused => {}
            }
        }

        // Bridge mutex before control, the same order as an application
        // thread that pauses while holding the device lock.
        let _guard = self.bridge.mutex().lock_guard();
        let mut control = self.control();
        if matches!(control.state, DeviceState::Running | DeviceState::Paused) {
            self.bridge.set_paused(paused);
            control.state = if paused {
                DeviceState::Paused
            } else {
                DeviceState::Running
            };
            log::debug!("[AUDIO] Device {:?}", control.state);
        }
        Ok(())
    }

    /// Stop the driver, wait out any render in progress, free the buffers
    pub fn close(self) {
        // Drop does the work
    }

    fn shutdown(&mut self) {
        let control = self
            .control
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if control.state == DeviceState::Closed {
            return;
        }

        // A render waiting for the lock would never finish, and stop() would
        // wait for it forever.
        while self.bridge.mutex().is_held_by_current() {
            log::warn!("[AUDIO] Closing a device while holding its lock, releasing it");
            if self.bridge.mutex().unlock().is_err() {
                break;
            }
        }

        if control.state != DeviceState::Open {
            control.driver.stop();
        }
        control.state = DeviceState::Closed;

        // Any render that got the lock before stop() returned has finished
        self.bridge.release();

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &self.bridge))
        {
            *slot = None;
        }

        log::info!("[AUDIO] {} device closed", self.driver_name);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDevice")
            .field("driver", &self.driver_name)
            .field("format", &self.format)
            .field("state", &self.state())
            .finish()
    }
}

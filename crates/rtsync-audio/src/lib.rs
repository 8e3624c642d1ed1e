//! rtsync Audio - Lock-protected fill callback bridge
//!
//! An application opens one output device with a fill routine. Whatever
//! thread the driver renders on, the fill routine runs under the device's
//! recursive mutex, so the application can hold it off with
//! [`AudioDevice::lock`] while it changes shared state.
//!
//! # Architecture
//!
//! ```text
//! AudioBackend::open ──► AudioDriver::open (narrowing the format on refusal)
//!                    ──► AudioDevice { Bridge, driver }
//!
//! driver thread ──► Renderer::render_* ──► bridge mutex ──► fill(buf) / silence
//! ```

mod backend;
mod bridge;
pub mod config;
pub mod convert;
mod device;
mod driver;
mod dummy_driver;
mod error;
mod spec;

#[cfg(feature = "cpal-backend")]
mod cpal_driver;
#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_driver;

pub use backend::AudioBackend;
pub use bridge::{FillFn, Renderer};
pub use config::{AudioConfig, DriverKind, Settings};
pub use device::{AudioDevice, DeviceState};
pub use driver::{AudioDriver, DeviceInfo, DriverError};
pub use dummy_driver::{DummyDriver, DUMMY_DEVICE};
pub use error::{AudioError, AudioResult};
pub use spec::{AudioSpec, DriverFormat, SampleLayout};

#[cfg(feature = "cpal-backend")]
pub use cpal_driver::CpalDriver;
#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub use jack_driver::JackDriver;

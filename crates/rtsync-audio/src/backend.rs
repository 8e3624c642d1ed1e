//! Driver registry and device opening
//!
//! Automatically picks drivers in this order when the config says `auto`:
//! - **jack**: Linux with the `jack-backend` feature
//! - **cpal**: any platform with the `cpal-backend` feature
//! - **dummy**: always, last
//!
//! Only one device can be open per backend at a time. The slot holding it is
//! cleared when the device is closed or dropped.

use std::sync::{Arc, PoisonError};

use crate::bridge::{Bridge, FillFn};
use crate::config::{AudioConfig, DriverKind};
use crate::device::{AudioDevice, DeviceSlot};
use crate::driver::{AudioDriver, DeviceInfo, DriverError};
use crate::dummy_driver::DummyDriver;
use crate::error::{AudioError, AudioResult};
use crate::spec::{AudioSpec, DriverFormat};

type DriverCtor = Box<dyn Fn() -> Box<dyn AudioDriver> + Send + Sync>;

struct DriverEntry {
    name: &'static str,
    create: DriverCtor,
}

/// Opens devices through the configured drivers
pub struct AudioBackend {
    config: AudioConfig,
    drivers: Vec<DriverEntry>,
    current: DeviceSlot,
}

impl AudioBackend {
    /// Backend with the built-in drivers selected by `config.driver`
    pub fn new(config: &AudioConfig) -> Self {
        let mut backend = Self::empty(config);

        let wants = |kind: DriverKind| config.driver == DriverKind::Auto || config.driver == kind;

        #[cfg(all(target_os = "linux", feature = "jack-backend"))]
        if wants(DriverKind::Jack) {
            backend = backend.with_driver("jack", || {
                Box::new(crate::jack_driver::JackDriver::new()) as Box<dyn AudioDriver>
            });
        }

        #[cfg(feature = "cpal-backend")]
        if wants(DriverKind::Cpal) {
            backend = backend.with_driver("cpal", || {
                Box::new(crate::cpal_driver::CpalDriver::new()) as Box<dyn AudioDriver>
            });
        }

        if wants(DriverKind::Dummy) {
            backend = backend.with_driver("dummy", || {
                Box::new(DummyDriver::new()) as Box<dyn AudioDriver>
            });
        }

        if backend.drivers.is_empty() {
            log::warn!(
                "[AUDIO] Driver '{}' is not compiled in, no device can be opened",
                config.driver.name()
            );
        }

        backend
    }

    /// Backend with no drivers; add some with [`AudioBackend::with_driver`]
    pub fn empty(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            drivers: Vec::new(),
            current: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Register a driver after the ones already present
    pub fn with_driver<F>(mut self, name: &'static str, create: F) -> Self
    where
        F: Fn() -> Box<dyn AudioDriver> + Send + Sync + 'static,
    {
        self.drivers.push(DriverEntry {
            name,
            create: Box::new(create),
        });
        self
    }

    /// Registered driver names, in the order they are tried
    pub fn drivers(&self) -> Vec<&'static str> {
        self.drivers.iter().map(|entry| entry.name).collect()
    }

    /// Output devices offered by one driver
    pub fn devices(&self, driver: &str) -> AudioResult<Vec<DeviceInfo>> {
        let entry = self
            .drivers
            .iter()
            .find(|entry| entry.name == driver)
            .ok_or_else(|| AudioError::DeviceUnavailable(format!("no driver named '{}'", driver)))?;
        Ok((entry.create)().devices())
    }

    /// Whether a device is currently open
    pub fn is_open(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Open the configured device with the configured format
    pub fn open_default<F>(&self, fill: F) -> AudioResult<AudioDevice>
    where
        F: FnMut(&mut [u8]) + Send + 'static,
    {
        self.open(&self.config.desired_spec(), fill)
    }

    /// Open the configured device, asking for `desired`
    ///
    /// The device starts in [`crate::DeviceState::Open`]; call
    /// `pause(false)` to start calling `fill`. The obtained format is
    /// [`AudioDevice::spec`] and may be narrower than `desired`.
    pub fn open<F>(&self, desired: &AudioSpec, fill: F) -> AudioResult<AudioDevice>
    where
        F: FnMut(&mut [u8]) + Send + 'static,
    {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            return Err(AudioError::AlreadyOpen);
        }

        let device_name = self.config.device.as_deref();
        let mut last_error =
            AudioError::DeviceUnavailable(format!("no driver for '{}'", self.config.driver.name()));

        for entry in &self.drivers {
            let mut driver = (entry.create)();
            match negotiate(driver.as_mut(), device_name, desired) {
                Ok(format) => {
                    let fill: FillFn = Box::new(fill);
                    let bridge = Arc::new(Bridge::new(format, fill)?);
                    *current = Some(bridge.clone());

                    log::info!(
                        "[AUDIO] Opened {} device '{}': wanted {}, got {} ({:?})",
                        entry.name,
                        device_name.unwrap_or("default"),
                        desired,
                        format.spec,
                        format.layout
                    );
                    return Ok(AudioDevice::new(bridge, format, driver, self.current.clone()));
                }
                Err(e) => {
                    log::info!("[AUDIO] Driver '{}' failed: {}", entry.name, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Open with `desired`, narrowing the format each time the driver refuses it
fn negotiate(
    driver: &mut dyn AudioDriver,
    device: Option<&str>,
    desired: &AudioSpec,
) -> AudioResult<DriverFormat> {
    let mut spec = *desired;
    loop {
        match driver.open(device, &spec) {
            Ok(format) => return Ok(format),
            Err(DriverError::Unavailable(reason)) => {
                return Err(AudioError::DeviceUnavailable(reason));
            }
            Err(DriverError::BadFormat) => match spec.narrowed() {
                Some(next) => {
                    log::debug!(
                        "[AUDIO] {} refused {}, retrying with {}",
                        driver.name(),
                        spec,
                        next
                    );
                    spec = next;
                }
                None => return Err(AudioError::FormatUnsupported(desired.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Renderer;

    /// Accepts only 8-bit mono, never renders
    struct PickyDriver;

    impl AudioDriver for PickyDriver {
        fn name(&self) -> &'static str {
            "picky"
        }

        fn devices(&self) -> Vec<DeviceInfo> {
            vec![DeviceInfo {
                name: "picky0".to_string(),
                is_default: true,
                max_channels: 1,
            }]
        }

        fn open(
            &mut self,
            device: Option<&str>,
            desired: &AudioSpec,
        ) -> Result<DriverFormat, DriverError> {
            if device.is_some_and(|name| name != "picky0") {
                return Err(DriverError::Unavailable("no such device".to_string()));
            }
            if desired.bits == 8 && desired.channels == 1 {
                Ok(DriverFormat::interleaved(*desired))
            } else {
                Err(DriverError::BadFormat)
            }
        }

        fn start(&mut self, _renderer: Renderer) -> AudioResult<()> {
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn picky(config: &AudioConfig) -> AudioBackend {
        AudioBackend::empty(config)
            .with_driver("picky", || Box::new(PickyDriver) as Box<dyn AudioDriver>)
    }

    #[test]
    fn test_negotiation_narrows_to_accepted_format() {
        let backend = picky(&AudioConfig::default());
        let device = backend
            .open(&AudioSpec::new(44100, 16, 2, 512), |_: &mut [u8]| {})
            .unwrap();
        assert_eq!(device.spec().bits, 8);
        assert_eq!(device.spec().channels, 1);
        assert_eq!(device.spec().freq, 44100);
    }

    #[test]
    fn test_second_open_is_refused_until_close() {
        let backend = picky(&AudioConfig::default());
        let spec = AudioSpec::new(22050, 8, 1, 256);

        let first = backend.open(&spec, |_: &mut [u8]| {}).unwrap();
        assert!(backend.is_open());
        assert_eq!(
            backend.open(&spec, |_: &mut [u8]| {}).unwrap_err(),
            AudioError::AlreadyOpen
        );

        first.close();
        assert!(!backend.is_open());
        assert!(backend.open(&spec, |_: &mut [u8]| {}).is_ok());
    }

    #[test]
    fn test_unknown_device_is_unavailable() {
        let backend = picky(&AudioConfig::default().with_device("missing"));
        let err = backend
            .open(&AudioSpec::new(8000, 8, 1, 64), |_: &mut [u8]| {})
            .unwrap_err();
        assert!(matches!(err, AudioError::DeviceUnavailable(_)));
        assert!(!backend.is_open());
    }

    #[test]
    fn test_no_drivers_is_unavailable() {
        let backend = AudioBackend::empty(&AudioConfig::default());
        assert!(backend.drivers().is_empty());
        assert!(matches!(
            backend.open_default(|_: &mut [u8]| {}),
            Err(AudioError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_builtin_dummy_is_last() {
        let backend = AudioBackend::new(&AudioConfig::default());
        assert_eq!(backend.drivers().last(), Some(&"dummy"));

        let backend = AudioBackend::new(&AudioConfig::default().with_driver(DriverKind::Dummy));
        assert_eq!(backend.drivers(), vec!["dummy"]);
        assert_eq!(backend.devices("dummy").unwrap()[0].name, "dummy");
    }
}

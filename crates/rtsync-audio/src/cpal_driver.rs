//! CPAL output driver
//!
//! CPAL calls us from its own audio thread with an interleaved byte buffer,
//! which goes straight to [`Renderer::render_interleaved`].
//!
//! A CPAL stream cannot be moved between threads on every platform, so it is
//! built, played and finally dropped on a helper thread that does nothing
//! else but wait for `stop`:
//!
//! ```text
//!   start()                         helper thread
//!   ───────                         ─────────────
//!   spawn ─────────────────────────► build_output_stream_raw + play
//!   recv() ◄──── ready channel ───── Ok / Err
//!                                    wait(stop_sem)
//!   stop(): post(stop_sem) ────────► drop stream (waits for callback)
//!           join ◄────────────────── exit
//! ```

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedBufferSize};
use std::sync::Arc;

use rtsync_core::sync::{Semaphore, Thread};

use crate::bridge::Renderer;
use crate::driver::{AudioDriver, DeviceInfo, DriverError};
use crate::error::{AudioError, AudioResult};
use crate::spec::{AudioSpec, DriverFormat};

struct Opened {
    device_name: Option<String>,
    config: StreamConfig,
    sample_format: SampleFormat,
}

struct Worker {
    thread: Thread,
    stop: Arc<Semaphore>,
}

/// Output through the default CPAL host
pub struct CpalDriver {
    opened: Option<Opened>,
    worker: Option<Worker>,
}

impl CpalDriver {
    pub fn new() -> Self {
        Self {
            opened: None,
            worker: None,
        }
    }
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a device by name on the default host, or its default output
fn find_device(name: Option<&str>) -> Result<cpal::Device, DriverError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| DriverError::Unavailable("no default output device".to_string())),
        Some(name) => host
            .output_devices()
            .map_err(|e| DriverError::Unavailable(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(name))
            .ok_or_else(|| DriverError::Unavailable(format!("device not found: {}", name))),
    }
}

fn sample_format_for(spec: &AudioSpec) -> Option<SampleFormat> {
    match (spec.bits, spec.float) {
        (8, false) => Some(SampleFormat::U8),
        (16, false) => Some(SampleFormat::I16),
        (32, false) => Some(SampleFormat::I32),
        (32, true) => Some(SampleFormat::F32),
        _ => None,
    }
}

impl AudioDriver for CpalDriver {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices = match host.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                log::debug!("[CPAL] Could not enumerate devices: {}", e);
                return Vec::new();
            }
        };

        devices
            .filter_map(|device| {
                let name = device.name().ok()?;
                let max_channels = device
                    .supported_output_configs()
                    .ok()?
                    .map(|c| c.channels())
                    .max()?;
                Some(DeviceInfo {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    name,
                    max_channels,
                })
            })
            .collect()
    }

    fn open(
        &mut self,
        device: Option<&str>,
        desired: &AudioSpec,
    ) -> Result<DriverFormat, DriverError> {
        let cpal_device = find_device(device)?;
        let sample_format = sample_format_for(desired).ok_or(DriverError::BadFormat)?;

        let ranges: Vec<_> = cpal_device
            .supported_output_configs()
            .map_err(|e| DriverError::Unavailable(e.to_string()))?
            .filter(|c| c.channels() == desired.channels && c.sample_format() == sample_format)
            .collect();

        // Prefer a range that covers the requested rate, else clamp into the first
        let range = ranges
            .iter()
            .find(|c| (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&desired.freq))
            .or_else(|| ranges.first())
            .ok_or(DriverError::BadFormat)?;

        let freq = desired
            .freq
            .clamp(range.min_sample_rate().0, range.max_sample_rate().0);
        let buffer_size = match range.buffer_size() {
            SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&desired.samples) => {
                BufferSize::Fixed(desired.samples)
            }
            _ => BufferSize::Default,
        };

        if freq != desired.freq {
            log::info!(
                "[CPAL] Device doesn't support {}Hz, using {}Hz",
                desired.freq,
                freq
            );
        }

        self.opened = Some(Opened {
            device_name: device.map(str::to_string),
            config: StreamConfig {
                channels: desired.channels,
                sample_rate: SampleRate(freq),
                buffer_size,
            },
            sample_format,
        });

        Ok(DriverFormat::interleaved(AudioSpec { freq, ..*desired }))
    }

    fn start(&mut self, renderer: Renderer) -> AudioResult<()> {
        let opened = self
            .opened
            .as_ref()
            .ok_or_else(|| AudioError::InvalidState("cpal driver not opened".to_string()))?;

        let device_name = opened.device_name.clone();
        let config = opened.config.clone();
        let sample_format = opened.sample_format;
        let (channels, rate) = (config.channels, config.sample_rate.0);
        let stop = Arc::new(Semaphore::new(0)?);
        let (ready_tx, ready_rx) = crossbeam::channel::bounded::<Result<(), String>>(1);

        let thread = {
            let stop = stop.clone();
            Thread::spawn("rtsync-cpal", move || {
                let error_renderer = renderer.clone();
                let stream = find_device(device_name.as_deref())
                    .map_err(|e| format!("{:?}", e))
                    .and_then(|device| {
                        device
                            .build_output_stream_raw(
                                &config,
                                sample_format,
                                move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                                    renderer.render_interleaved(data.bytes_mut());
                                },
                                move |err| error_renderer.report_error(&err.to_string()),
                                None,
                            )
                            .map_err(|e| e.to_string())
                    })
                    .and_then(|stream| stream.play().map(|_| stream).map_err(|e| e.to_string()));

                let stream = match stream {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return 1;
                    }
                };

                stop.wait();
                drop(stream);
                0
            })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!(
                    "[CPAL] Stream started: {} channels, {}Hz, {:?}",
                    channels,
                    rate,
                    sample_format
                );
                self.worker = Some(Worker { thread, stop });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.wait();
                Err(AudioError::StreamError(e))
            }
            Err(_) => {
                let _ = thread.wait();
                Err(AudioError::StreamError(
                    "stream thread exited before reporting".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.stop.post();
        if let Err(e) = worker.thread.wait() {
            log::error!("[CPAL] Stream thread failed: {}", e);
        }
        log::info!("[CPAL] Stream stopped");
    }
}

impl Drop for CpalDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

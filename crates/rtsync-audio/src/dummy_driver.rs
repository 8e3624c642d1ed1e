//! Timer-driven output driver
//!
//! Renders into a double buffer on a high-priority helper thread and throws
//! the audio away. The "hardware" hands a buffer back one period after it was
//! queued (a oneshot timer posts the buffer-ready semaphore), so the fill
//! routine is called at roughly the real-time rate:
//!
//! ```text
//!   helper thread                      oneshot worker
//!   ─────────────                      ──────────────
//!   wait(buffer_ready) ◄── post ────── period elapsed
//!   render into buffers[i]
//!   queue buffers[i] ───── schedule ─► (period ms)
//!   i ^= 1
//! ```
//!
//! The wait uses a short timeout so `stop` is noticed even when no buffer
//! comes back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rtsync_core::sync::{set_priority, Semaphore, Thread, ThreadPriority};
use rtsync_core::timer::schedule_oneshot;

use crate::bridge::Renderer;
use crate::driver::{AudioDriver, DeviceInfo, DriverError};
use crate::error::AudioResult;
use crate::spec::{AudioSpec, DriverFormat};

/// Only device this driver offers
pub const DUMMY_DEVICE: &str = "dummy";

/// How often a waiting helper thread checks for `stop`
const CANCEL_POLL: Duration = Duration::from_millis(10);

const NUM_BUFFERS: u32 = 2;

struct Worker {
    thread: Thread,
    stop: Arc<AtomicBool>,
    buffer_ready: Arc<Semaphore>,
}

/// Dummy output: 8/16-bit, mono/stereo, any rate
pub struct DummyDriver {
    worker: Option<Worker>,
}

impl DummyDriver {
    pub fn new() -> Self {
        Self { worker: None }
    }
}

impl Default for DummyDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDriver for DummyDriver {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            name: DUMMY_DEVICE.to_string(),
            is_default: true,
            max_channels: 2,
        }]
    }

    fn open(
        &mut self,
        device: Option<&str>,
        desired: &AudioSpec,
    ) -> Result<DriverFormat, DriverError> {
        if let Some(name) = device {
            if name != DUMMY_DEVICE {
                return Err(DriverError::Unavailable(format!("no dummy device '{}'", name)));
            }
        }
        if desired.freq == 0 || desired.samples == 0 {
            return Err(DriverError::Unavailable(format!("unusable format {}", desired)));
        }

        let bits_ok = matches!(desired.bits, 8 | 16) && !desired.float;
        let channels_ok = matches!(desired.channels, 1 | 2);
        if bits_ok && channels_ok {
            Ok(DriverFormat::interleaved(*desired))
        } else {
            Err(DriverError::BadFormat)
        }
    }

    fn start(&mut self, renderer: Renderer) -> AudioResult<()> {
        let spec = renderer.format().spec;
        let period_ms = period_ms(&spec);
        let stop = Arc::new(AtomicBool::new(false));
        let buffer_ready = Arc::new(Semaphore::new(NUM_BUFFERS)?);

        let thread = {
            let stop = stop.clone();
            let buffer_ready = buffer_ready.clone();
            Thread::spawn("rtsync-dummy-audio", move || {
                set_priority(ThreadPriority::High);
                log::debug!("[DUMMY] Helper thread started ({}ms period)", period_ms);

                let mut buffers = [
                    vec![spec.silence(); spec.buffer_bytes()],
                    vec![spec.silence(); spec.buffer_bytes()],
                ];
                let mut current = 0;

                loop {
                    while !buffer_ready.wait_timeout(CANCEL_POLL) {
                        if stop.load(Ordering::Acquire) {
                            return 0;
                        }
                    }
                    if stop.load(Ordering::Acquire) {
                        return 0;
                    }

                    renderer.render_interleaved(&mut buffers[current]);

                    let played = buffer_ready.clone();
                    if let Err(e) = schedule_oneshot(period_ms, move || played.post()) {
                        log::error!("[DUMMY] Cannot queue buffer: {}", e);
                        renderer.report_error(&e.to_string());
                        return 1;
                    }
                    current = (current + 1) % buffers.len();
                }
            })?
        };

        self.worker = Some(Worker {
            thread,
            stop,
            buffer_ready,
        });
        Ok(())
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.stop.store(true, Ordering::Release);
        worker.buffer_ready.post();
        match worker.thread.wait() {
            Ok(status) => log::debug!("[DUMMY] Helper thread exited ({})", status),
            Err(e) => log::error!("[DUMMY] Helper thread failed: {}", e),
        }
    }
}

impl Drop for DummyDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Length of one buffer in whole milliseconds, at least 1
fn period_ms(spec: &AudioSpec) -> u32 {
    let ms = u64::from(spec.samples) * 1000 / u64::from(spec.freq.max(1));
    u32::try_from(ms).unwrap_or(u32::MAX).max(1)
}

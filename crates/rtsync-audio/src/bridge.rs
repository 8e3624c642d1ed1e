//! The lock-protected link between a driver callback and the fill routine
//!
//! Every render call takes the bridge mutex, produces exactly one buffer and
//! releases the mutex before returning to the driver:
//!
//! ```text
//!   driver thread                         application threads
//!   ─────────────                         ───────────────────
//!   render_*()                            device.lock()
//!     lock ──────────── bridge mutex ────── (blocks the next render)
//!     paused? silence : fill(buf)         device.pause(true/false)
//!     planar? deinterleave                device.unlock()
//!     swap bytes if foreign endian
//!     unlock
//! ```
//!
//! The paused flag and the fill routine are only read with the mutex held, so
//! a buffer is either entirely silence or entirely the fill routine's output.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rtsync_core::sync::Mutex;

use crate::convert::{deinterleave, swap_sample_bytes};
use crate::error::AudioResult;
use crate::spec::{DriverFormat, SampleLayout};

/// The application's fill routine: write one interleaved buffer
pub type FillFn = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

struct BridgeState {
    fill: Option<FillFn>,
    /// Interleaved staging buffer for planar drivers
    scratch: Vec<u8>,
}

pub(crate) struct Bridge {
    mutex: Mutex,
    paused: AtomicBool,
    failed: AtomicBool,
    format: DriverFormat,
    state: RefCell<BridgeState>,
}

// SAFETY: `state` is only borrowed while `mutex` is held by the calling
// thread (see `Renderer::render_*` and `Bridge::release`). The mutex
// serialises those borrows across threads; a same-thread re-entry is caught
// by `try_borrow_mut`.
unsafe impl Sync for Bridge {}

impl Bridge {
    pub(crate) fn new(format: DriverFormat, fill: FillFn) -> AudioResult<Self> {
        let scratch = match format.layout {
            SampleLayout::Planar => vec![0; format.spec.buffer_bytes()],
            SampleLayout::Interleaved => Vec::new(),
        };

        Ok(Self {
            mutex: Mutex::new()?,
            paused: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            format,
            state: RefCell::new(BridgeState {
                fill: Some(fill),
                scratch,
            }),
        })
    }

    pub(crate) fn mutex(&self) -> &Mutex {
        &self.mutex
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        let _guard = self.mutex.lock_guard();
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Drop the fill routine and buffers once the driver has stopped
    pub(crate) fn release(&self) {
        let _guard = self.mutex.lock_guard();
        match self.state.try_borrow_mut() {
            Ok(mut state) => {
                state.fill = None;
                state.scratch = Vec::new();
            }
            Err(_) => log::warn!("[AUDIO] Device closed from inside its own fill routine"),
        }
    }
}

/// Handle a driver uses to produce buffers
///
/// Cheap to clone. Safe to call from any thread, one buffer per call.
#[derive(Clone)]
pub struct Renderer {
    bridge: Arc<Bridge>,
}

impl Renderer {
    pub(crate) fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    /// Format agreed at open time
    pub fn format(&self) -> DriverFormat {
        self.bridge.format
    }

    /// Fill one interleaved hardware buffer, every byte of it
    pub fn render_interleaved(&self, out: &mut [u8]) {
        let bridge = &*self.bridge;
        let spec = bridge.format.spec;
        let _guard = bridge.mutex.lock_guard();

        match bridge.state.try_borrow_mut() {
            Ok(mut state) => match state.fill.as_mut() {
                Some(fill) if !bridge.paused.load(Ordering::Relaxed) => fill(&mut *out),
                _ => out.fill(spec.silence()),
            },
            Err(_) => {
                log::error!("[AUDIO] Render re-entered from the fill routine");
                out.fill(spec.silence());
            }
        }

        if bridge.format.needs_swap() {
            swap_sample_bytes(out, spec.bytes_per_sample());
        }
    }

    /// Fill one buffer per channel with `frames` samples each
    ///
    /// The fill routine still sees one interleaved buffer; it is split here.
    pub fn render_planar<P: AsMut<[u8]>>(&self, planes: &mut [P], frames: usize) {
        let bridge = &*self.bridge;
        let spec = bridge.format.spec;
        let bps = spec.bytes_per_sample();
        let _guard = bridge.mutex.lock_guard();

        let Ok(mut state) = bridge.state.try_borrow_mut() else {
            log::error!("[AUDIO] Render re-entered from the fill routine");
            for plane in planes.iter_mut() {
                plane.as_mut().fill(spec.silence());
            }
            return;
        };
        let BridgeState { fill, scratch } = &mut *state;

        let needed = frames * planes.len() * bps;
        if scratch.len() < needed {
            // Only when the driver hands us more than it announced
            log::debug!("[AUDIO] Growing planar scratch to {} bytes", needed);
            scratch.resize(needed, 0);
        }
        let interleaved = &mut scratch[..needed];

        match fill.as_mut() {
            Some(fill) if !bridge.paused.load(Ordering::Relaxed) => fill(&mut *interleaved),
            _ => interleaved.fill(spec.silence()),
        }

        deinterleave(interleaved, planes, frames, bps);

        if bridge.format.needs_swap() {
            for plane in planes.iter_mut() {
                let plane = plane.as_mut();
                let len = plane.len().min(frames * bps);
                swap_sample_bytes(&mut plane[..len], bps);
            }
        }
    }

    /// Report a fatal stream error from the driver side
    ///
    /// The device stays open but refuses to resume until reopened.
    pub fn report_error(&self, message: &str) {
        log::error!("[AUDIO] Stream error: {}", message);
        self.bridge.failed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::AudioSpec;

    fn renderer(format: DriverFormat, fill: FillFn) -> Renderer {
        Renderer::new(Arc::new(Bridge::new(format, fill).unwrap()))
    }

    #[test]
    fn test_paused_renders_silence() {
        let spec = AudioSpec::new(8000, 8, 1, 16);
        let r = renderer(
            DriverFormat::interleaved(spec),
            Box::new(|buf: &mut [u8]| buf.fill(0x42)),
        );

        let mut out = vec![0u8; 16];
        r.render_interleaved(&mut out);
        assert!(out.iter().all(|&b| b == 0x42));

        r.bridge.set_paused(true);
        r.render_interleaved(&mut out);
        assert!(out.iter().all(|&b| b == 0x80));
    }

    #[test]
    fn test_planar_is_deinterleaved_and_swapped() {
        let spec = AudioSpec::new(44100, 16, 2, 2);
        let format = DriverFormat::planar(spec).with_big_endian(!cfg!(target_endian = "big"));
        // L0 R0 L1 R1
        let r = renderer(
            format,
            Box::new(|buf: &mut [u8]| {
                buf.copy_from_slice(&[0x01, 0x02, 0x11, 0x12, 0x03, 0x04, 0x13, 0x14])
            }),
        );

        let mut planes = vec![vec![0u8; 4], vec![0u8; 4]];
        r.render_planar(&mut planes, 2);
        assert_eq!(planes[0], [0x02, 0x01, 0x04, 0x03]);
        assert_eq!(planes[1], [0x12, 0x11, 0x14, 0x13]);
    }

    #[test]
    fn test_released_bridge_renders_silence() {
        let spec = AudioSpec::new(44100, 16, 2, 8);
        let r = renderer(
            DriverFormat::interleaved(spec),
            Box::new(|buf: &mut [u8]| buf.fill(0x7f)),
        );
        r.bridge.release();

        let mut out = vec![0xffu8; spec.buffer_bytes()];
        r.render_interleaved(&mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_report_error_marks_failed() {
        let spec = AudioSpec::new(44100, 16, 2, 8);
        let r = renderer(DriverFormat::interleaved(spec), Box::new(|_: &mut [u8]| {}));
        assert!(!r.bridge.has_failed());
        r.report_error("device unplugged");
        assert!(r.bridge.has_failed());
    }
}

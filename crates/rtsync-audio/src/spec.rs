//! Sample format descriptions
//!
//! [`AudioSpec`] is what the application asks for and gets back.
//! [`DriverFormat`] adds what only the driver cares about: whether the
//! hardware wants one interleaved buffer or one buffer per channel, and its
//! byte order.

use std::fmt;

/// Rate, sample width, channel count and buffer length of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    /// Frames per second
    pub freq: u32,
    /// Bits per sample: 8 (unsigned), 16, 24 or 32 (signed or float)
    pub bits: u8,
    pub channels: u16,
    /// Frames per callback
    pub samples: u32,
    /// 32-bit samples are IEEE floats rather than integers
    pub float: bool,
}

impl AudioSpec {
    /// Integer samples
    pub fn new(freq: u32, bits: u8, channels: u16, samples: u32) -> Self {
        Self {
            freq,
            bits,
            channels,
            samples,
            float: false,
        }
    }

    /// 32-bit float samples
    pub fn float32(freq: u32, channels: u16, samples: u32) -> Self {
        Self {
            freq,
            bits: 32,
            channels,
            samples,
            float: true,
        }
    }

    /// Byte value that encodes silence: 0x80 for unsigned 8-bit, 0 otherwise
    pub fn silence(&self) -> u8 {
        if self.bits == 8 && !self.float {
            0x80
        } else {
            0
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits).div_ceil(8)
    }

    /// Bytes in one frame (one sample per channel)
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// Bytes in one interleaved callback buffer
    pub fn buffer_bytes(&self) -> usize {
        self.frame_bytes() * self.samples as usize
    }

    /// The next, more conservative format to try after a driver refused this one
    ///
    /// Order: anything wider than 16 bits drops to 16-bit integer, more than
    /// two channels drops to stereo, stereo drops to mono, 16-bit drops to
    /// 8-bit. `None` once nothing narrower is left.
    pub fn narrowed(&self) -> Option<AudioSpec> {
        let mut next = *self;
        if self.bits > 16 || self.float {
            next.bits = 16;
            next.float = false;
        } else if self.channels > 2 {
            next.channels = 2;
        } else if self.channels == 2 {
            next.channels = 1;
        } else if self.bits == 16 {
            next.bits = 8;
        } else {
            return None;
        }
        Some(next)
    }
}

impl fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}-bit{} {}ch x{}",
            self.freq,
            self.bits,
            if self.float { " float" } else { "" },
            self.channels,
            self.samples
        )
    }
}

/// How the hardware wants its buffers laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// One buffer, channels alternating per frame
    Interleaved,
    /// One buffer per channel
    Planar,
}

/// Format a driver accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverFormat {
    /// Obtained format, as seen by the fill routine
    pub spec: AudioSpec,
    pub layout: SampleLayout,
    /// Hardware byte order
    pub big_endian: bool,
}

impl DriverFormat {
    /// Interleaved, host byte order
    pub fn interleaved(spec: AudioSpec) -> Self {
        Self {
            spec,
            layout: SampleLayout::Interleaved,
            big_endian: cfg!(target_endian = "big"),
        }
    }

    /// Planar, host byte order
    pub fn planar(spec: AudioSpec) -> Self {
        Self {
            spec,
            layout: SampleLayout::Planar,
            big_endian: cfg!(target_endian = "big"),
        }
    }

    pub fn with_big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    /// Whether samples must be byte-swapped on their way to the hardware
    pub fn needs_swap(&self) -> bool {
        self.big_endian != cfg!(target_endian = "big") && self.spec.bytes_per_sample() > 1
    }
}

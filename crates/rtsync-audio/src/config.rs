//! Audio settings
//!
//! Defines which driver to use, the output device and the format the
//! application asks for. The obtained format may be narrower.

use std::path::Path;

use rtsync_core::config::{load_config, save_config, ThreadsConfig};
use serde::{Deserialize, Serialize};

use crate::spec::AudioSpec;

/// Largest buffer any driver pre-allocates for (frames)
pub const MAX_BUFFER_FRAMES: u32 = 8192;

/// Default buffer size when no preference is specified (frames)
/// 1024 frames @ 44.1kHz is ~23ms, safe for the timer-driven dummy driver
pub const DEFAULT_BUFFER_FRAMES: u32 = 1024;

/// Default output rate (CD quality, accepted by every driver)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

pub const DEFAULT_BITS: u8 = 16;
pub const DEFAULT_CHANNELS: u16 = 2;

/// Which driver to open devices with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Try every compiled-in driver, hardware first, dummy last
    #[default]
    Auto,
    /// Timer-driven output that discards samples
    Dummy,
    /// CPAL output (needs the `cpal-backend` feature)
    Cpal,
    /// JACK client (needs the `jack-backend` feature, Linux only)
    Jack,
}

impl DriverKind {
    pub fn name(self) -> &'static str {
        match self {
            DriverKind::Auto => "auto",
            DriverKind::Dummy => "dummy",
            DriverKind::Cpal => "cpal",
            DriverKind::Jack => "jack",
        }
    }
}

/// Configuration for the audio bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub driver: DriverKind,

    /// Output device name (None = the driver's default device)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    pub sample_rate: u32,

    /// Bits per sample (8, 16, 24 or 32)
    pub bits: u8,

    pub channels: u16,

    /// Frames per callback
    pub buffer_frames: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Auto,
            device: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bits: DEFAULT_BITS,
            channels: DEFAULT_CHANNELS,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
        }
    }
}

impl AudioConfig {
    /// Set the driver
    pub fn with_driver(mut self, driver: DriverKind) -> Self {
        self.driver = driver;
        self
    }

    /// Set the output device
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_bits(mut self, bits: u8) -> Self {
        self.bits = bits;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Set the buffer size in frames (clamped to [`MAX_BUFFER_FRAMES`])
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_frames = frames.clamp(1, MAX_BUFFER_FRAMES);
        self
    }

    /// The format to request when opening a device
    pub fn desired_spec(&self) -> AudioSpec {
        AudioSpec::new(
            self.sample_rate,
            self.bits,
            self.channels,
            self.buffer_frames.clamp(1, MAX_BUFFER_FRAMES),
        )
    }

    /// Latency of one buffer in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_frames as f32 / self.sample_rate.max(1) as f32) * 1000.0
    }
}

/// Whole settings file: `threads` and `audio` sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub threads: ThreadsConfig,
    pub audio: AudioConfig,
}

impl Settings {
    /// Load from `path`, falling back to defaults
    pub fn load(path: &Path) -> Self {
        load_config(path)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        save_config(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtsync_core::config::BackendKind;

    #[test]
    fn test_defaults_are_cd_quality_stereo() {
        let spec = AudioConfig::default().desired_spec();
        assert_eq!(spec.freq, 44100);
        assert_eq!(spec.bits, 16);
        assert_eq!(spec.channels, 2);
        assert!(!spec.float);
    }

    #[test]
    fn test_buffer_frames_are_clamped() {
        let config = AudioConfig::default().with_buffer_frames(1 << 20);
        assert_eq!(config.buffer_frames, MAX_BUFFER_FRAMES);
        let config = AudioConfig::default().with_buffer_frames(0);
        assert_eq!(config.buffer_frames, 1);
    }

    #[test]
    fn test_latency() {
        let config = AudioConfig::default()
            .with_sample_rate(48000)
            .with_buffer_frames(480);
        assert!((config.latency_ms() - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtsync.yaml");

        let settings = Settings {
            threads: ThreadsConfig::default().with_backend(BackendKind::SemaphoreOnly),
            audio: AudioConfig::default()
                .with_driver(DriverKind::Dummy)
                .with_device("dummy")
                .with_channels(1),
        };
        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path), settings);
    }

    #[test]
    fn test_partial_yaml() {
        let settings: Settings =
            serde_yaml::from_str("audio:\n  driver: jack\n  bits: 8\n").unwrap();
        assert_eq!(settings.audio.driver, DriverKind::Jack);
        assert_eq!(settings.audio.bits, 8);
        assert_eq!(settings.audio.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(settings.threads, ThreadsConfig::default());
    }
}

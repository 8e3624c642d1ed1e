//! rtsync-probe - list audio drivers and play a short test tone
//!
//! ## Command line flags
//!
//! - `--list`: only list drivers and devices
//! - `--seconds N`: play for N seconds (default 1)
//! - `--config PATH`: settings file (default `~/.config/rtsync/rtsync.yaml`)

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rtsync_audio::{AudioBackend, AudioSpec, Settings};
use rtsync_core::config::default_config_path;
use rtsync_core::timer::{msleep, ticks_us};

const TONE_HZ: f32 = 440.0;
const TONE_LEVEL: f32 = 0.2;

struct Args {
    list_only: bool,
    seconds: u32,
    config: PathBuf,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        list_only: false,
        seconds: 1,
        config: default_config_path(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--list" => args.list_only = true,
            "--seconds" => {
                let value = iter.next().context("--seconds needs a value")?;
                args.seconds = value
                    .parse()
                    .with_context(|| format!("invalid --seconds value '{}'", value))?;
            }
            "--config" => {
                args.config = iter.next().context("--config needs a path")?.into();
            }
            other => anyhow::bail!("unknown argument '{}'", other),
        }
    }
    Ok(args)
}

/// Fill routine writing a sine tone in whatever format was obtained
fn tone(spec: AudioSpec, frames_written: Arc<AtomicU64>) -> impl FnMut(&mut [u8]) + Send + 'static {
    let step = TONE_HZ / spec.freq.max(1) as f32 * std::f32::consts::TAU;
    let mut phase = 0.0f32;

    move |buf: &mut [u8]| {
        let frame_bytes = spec.frame_bytes();
        let bps = spec.bytes_per_sample();
        for frame in buf.chunks_exact_mut(frame_bytes) {
            let value = phase.sin() * TONE_LEVEL;
            phase = (phase + step) % std::f32::consts::TAU;
            for sample in frame.chunks_exact_mut(bps) {
                match (spec.bits, spec.float) {
                    (8, false) => sample[0] = (value * 127.0 + 128.0) as u8,
                    (16, false) => sample.copy_from_slice(&((value * 32767.0) as i16).to_ne_bytes()),
                    (32, true) => sample.copy_from_slice(&value.to_ne_bytes()),
                    (32, false) => sample.copy_from_slice(&((value * i32::MAX as f32) as i32).to_ne_bytes()),
                    _ => sample.fill(spec.silence()),
                }
            }
        }
        let frames = (buf.len() / frame_bytes.max(1)) as u64;
        frames_written.fetch_add(frames, Ordering::Relaxed);
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let settings = Settings::load(&args.config);
    let platform = rtsync_core::init(&settings.threads).context("threading backend")?;
    log::info!("Threading backend: {}", platform.name());

    let backend = AudioBackend::new(&settings.audio);
    for driver in backend.drivers() {
        println!("{}:", driver);
        for device in backend.devices(driver)? {
            println!("  - {}", device);
        }
    }

    if args.list_only {
        rtsync_core::shutdown();
        return Ok(());
    }

    let desired = settings.audio.desired_spec();
    let frames_written = Arc::new(AtomicU64::new(0));

    // Format is only known after open; the fill routine reads it from a slot
    let obtained: Arc<std::sync::OnceLock<AudioSpec>> = Arc::new(std::sync::OnceLock::new());
    let fill = {
        let obtained = obtained.clone();
        let frames_written = frames_written.clone();
        let mut tone_fn: Option<Box<dyn FnMut(&mut [u8]) + Send>> = None;
        move |buf: &mut [u8]| {
            if tone_fn.is_none() {
                if let Some(spec) = obtained.get() {
                    tone_fn = Some(Box::new(tone(*spec, frames_written.clone())));
                }
            }
            match tone_fn.as_mut() {
                Some(f) => f(buf),
                None => buf.fill(0),
            }
        }
    };

    let device = backend.open(&desired, fill).context("open audio device")?;
    let _ = obtained.set(device.spec());
    println!(
        "Opened {} device: wanted {}, got {} ({:?})",
        device.driver_name(),
        desired,
        device.spec(),
        device.format().layout
    );

    let started = ticks_us();
    device.pause(false)?;
    msleep(u64::from(args.seconds) * 1000);
    device.pause(true)?;
    let elapsed = Duration::from_micros(ticks_us() - started);

    let frames = frames_written.load(Ordering::Relaxed);
    println!(
        "Rendered {} frames in {:.2}s ({:.0} frames/s, expected {})",
        frames,
        elapsed.as_secs_f32(),
        frames as f32 / elapsed.as_secs_f32().max(f32::EPSILON),
        device.spec().freq
    );

    device.close();
    rtsync_core::shutdown();
    Ok(())
}

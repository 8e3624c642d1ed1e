//! JACK output driver
//!
//! Registers one `AudioOut` port per channel. JACK dictates the rate and the
//! period length and always plays 32-bit float, so the obtained format is
//! planar float whatever was asked for. The process callback renders one
//! buffer per port through [`Renderer::render_planar`] into preallocated
//! byte planes and copies them into the port buffers.
//!
//! A device name is a JACK client whose playback ports we connect to
//! (`system` when none is given).

use jack::{
    AsyncClient, AudioOut, Client, ClientOptions, Control, PortFlags, Port, ProcessScope,
};

use crate::bridge::Renderer;
use crate::config::MAX_BUFFER_FRAMES;
use crate::driver::{AudioDriver, DeviceInfo, DriverError};
use crate::error::{AudioError, AudioResult};
use crate::spec::{AudioSpec, DriverFormat};

const CLIENT_NAME: &str = "rtsync";
const DEFAULT_TARGET: &str = "system";
const MAX_PORTS: u16 = 8;
const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

struct Opened {
    client: Client,
    ports: Vec<Port<AudioOut>>,
    target: String,
}

struct Processor {
    ports: Vec<Port<AudioOut>>,
    renderer: Renderer,
    planes: Vec<Vec<u8>>,
}

impl jack::ProcessHandler for Processor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let frames = ps.n_frames() as usize;
        for plane in &mut self.planes {
            // Within the preallocated capacity unless JACK exceeds MAX_BUFFER_FRAMES
            plane.resize(frames * SAMPLE_BYTES, 0);
        }

        self.renderer.render_planar(&mut self.planes, frames);

        for (port, plane) in self.ports.iter_mut().zip(&self.planes) {
            let out = port.as_mut_slice(ps);
            for (sample, bytes) in out.iter_mut().zip(plane.chunks_exact(SAMPLE_BYTES)) {
                *sample = bytes.try_into().map(f32::from_ne_bytes).unwrap_or(0.0);
            }
        }

        Control::Continue
    }
}

struct Notifications {
    renderer: Renderer,
}

impl jack::NotificationHandler for Notifications {
    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        log::warn!("[JACK] Sample rate changed to {}", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("[JACK] xrun");
        Control::Continue
    }

    unsafe fn shutdown(&mut self, _status: jack::ClientStatus, reason: &str) {
        self.renderer
            .report_error(&format!("JACK server shut down: {}", reason));
    }
}

/// Output through a JACK client
pub struct JackDriver {
    opened: Option<Opened>,
    active: Option<AsyncClient<Notifications, Processor>>,
}

impl JackDriver {
    pub fn new() -> Self {
        Self {
            opened: None,
            active: None,
        }
    }
}

impl Default for JackDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Playback ports of `target`, sorted so `playback_1` comes first
fn playback_ports(client: &Client, target: &str) -> Vec<String> {
    let mut ports: Vec<String> = client
        .ports(Some(".*:playback_.*"), None, PortFlags::IS_INPUT)
        .into_iter()
        .filter(|name| name.split(':').next() == Some(target))
        .collect();
    ports.sort_by_key(|name| port_index(name));
    ports
}

fn port_index(name: &str) -> u32 {
    name.rsplit('_')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}

/// Group playback port names by owning client, in first-seen order
fn group_by_client(ports: &[String]) -> Vec<(String, u16)> {
    let mut groups: Vec<(String, u16)> = Vec::new();
    for port in ports {
        let owner = port.split(':').next().unwrap_or_default();
        match groups.iter_mut().find(|(name, _)| name == owner) {
            Some((_, count)) => *count = count.saturating_add(1),
            None => groups.push((owner.to_string(), 1)),
        }
    }
    groups
}

impl AudioDriver for JackDriver {
    fn name(&self) -> &'static str {
        "jack"
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        let client = match Client::new("rtsync_query", ClientOptions::NO_START_SERVER) {
            Ok((client, _)) => client,
            Err(e) => {
                log::debug!("[JACK] Could not connect to enumerate ports: {}", e);
                return Vec::new();
            }
        };

        let ports = client.ports(Some(".*:playback_.*"), None, PortFlags::IS_INPUT);
        group_by_client(&ports)
            .into_iter()
            .map(|(name, max_channels)| DeviceInfo {
                is_default: name == DEFAULT_TARGET,
                name,
                max_channels,
            })
            .collect()
    }

    fn open(
        &mut self,
        device: Option<&str>,
        desired: &AudioSpec,
    ) -> Result<DriverFormat, DriverError> {
        if desired.channels == 0 || desired.channels > MAX_PORTS {
            return Err(DriverError::BadFormat);
        }
        self.opened = None;

        let (client, _status) = Client::new(CLIENT_NAME, ClientOptions::NO_START_SERVER)
            .map_err(|e| DriverError::Unavailable(format!("JACK client: {}", e)))?;

        let target = device.unwrap_or(DEFAULT_TARGET).to_string();
        if device.is_some() && playback_ports(&client, &target).is_empty() {
            return Err(DriverError::Unavailable(format!(
                "no playback ports on '{}'",
                target
            )));
        }

        let ports = (1..=desired.channels)
            .map(|n| client.register_port(&format!("out_{}", n), AudioOut::default()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DriverError::Unavailable(format!("register port: {}", e)))?;

        let sample_rate = client.sample_rate() as u32;
        let buffer_size = client.buffer_size();
        log::info!(
            "[JACK] Client '{}' created ({}Hz, {} frames, {:.1}ms)",
            client.name(),
            sample_rate,
            buffer_size,
            buffer_size as f32 / sample_rate.max(1) as f32 * 1000.0
        );

        self.opened = Some(Opened {
            client,
            ports,
            target,
        });

        Ok(DriverFormat::planar(AudioSpec::float32(
            sample_rate,
            desired.channels,
            buffer_size,
        )))
    }

    fn start(&mut self, renderer: Renderer) -> AudioResult<()> {
        let Opened {
            client,
            ports,
            target,
        } = self
            .opened
            .take()
            .ok_or_else(|| AudioError::InvalidState("jack driver not opened".to_string()))?;

        let our_ports: Vec<String> = ports.iter().filter_map(|p| p.name().ok()).collect();
        let plane_capacity = client.buffer_size().max(MAX_BUFFER_FRAMES) as usize * SAMPLE_BYTES;
        let planes = ports
            .iter()
            .map(|_| Vec::with_capacity(plane_capacity))
            .collect();

        let notifications = Notifications {
            renderer: renderer.clone(),
        };
        let processor = Processor {
            ports,
            renderer,
            planes,
        };

        let active = client
            .activate_async(notifications, processor)
            .map_err(|e| AudioError::StreamError(format!("activate JACK client: {}", e)))?;
        log::info!("[JACK] Client activated");

        let targets = playback_ports(active.as_client(), &target);
        if targets.is_empty() {
            log::warn!("[JACK] No playback ports on '{}', leaving ports unconnected", target);
        }
        for (ours, theirs) in our_ports.iter().zip(&targets) {
            if let Err(e) = active.as_client().connect_ports_by_name(ours, theirs) {
                log::warn!("[JACK] Could not connect {} to {}: {}", ours, theirs, e);
            }
        }

        self.active = Some(active);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.deactivate() {
                log::error!("[JACK] Deactivate failed: {}", e);
            }
            log::info!("[JACK] Client deactivated");
        }
    }
}

impl Drop for JackDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

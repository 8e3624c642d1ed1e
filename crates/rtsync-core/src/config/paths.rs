//! Default locations of the rtsync settings file

use std::path::PathBuf;

/// Get the default config directory
///
/// Returns: `<platform config dir>/rtsync` (e.g. `~/.config/rtsync` on Linux),
/// or `./rtsync` when the platform has no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rtsync")
}

/// Get the default config file path
///
/// Returns: `<config dir>/rtsync/rtsync.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("rtsync.yaml")
}

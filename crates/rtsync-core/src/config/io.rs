//! YAML settings I/O
//!
//! Loading never fails: a missing or broken file falls back to the type's
//! defaults so the threading layer can always start. Saving reports errors.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load settings of type `T` from a YAML file, or `T::default()`
///
/// ```ignore
/// let threads: ThreadsConfig = load_config(&default_config_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("[CONFIG] {:?} not found, using defaults", path);
            return T::default();
        }
        Err(e) => {
            log::warn!("[CONFIG] Cannot read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("[CONFIG] Loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("[CONFIG] Invalid YAML in {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Write settings to a YAML file, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize settings")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;

    log::info!("[CONFIG] Saved {:?}", path);
    Ok(())
}

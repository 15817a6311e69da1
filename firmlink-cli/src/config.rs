//! Console configuration
//!
//! One small toml file remembering the last-used device address, so plain
//! `firmlink logs` reconnects to the device you talked to last time.

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FirmlinkConfig {
    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Last-used device address, `host:port`
    pub address: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Config file path (platform-specific)
    ///
    /// Can be overridden with the FIRMLINK_CONFIG_DIR env var (useful for
    /// isolated tests).
    pub fn path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("FIRMLINK_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.toml"));
        }
        ProjectDirs::from("", "", "firmlink").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the config, falling back to defaults when no file exists
    pub fn load() -> Result<FirmlinkConfig> {
        if let Some(path) = Self::path()
            && path.exists()
        {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            return toml::from_str(&contents)
                .with_context(|| format!("invalid config at {}", path.display()));
        }
        Ok(FirmlinkConfig::default())
    }

    /// Write the config back to disk, creating the directory if needed
    pub fn save(config: &FirmlinkConfig) -> Result<()> {
        let Some(path) = Self::path() else {
            anyhow::bail!("no config directory available on this platform");
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(config)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn save_then_load_round_trips_the_address() {
        let dir = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("FIRMLINK_CONFIG_DIR", dir.path()) };

        let config = FirmlinkConfig {
            device: DeviceConfig {
                address: Some("10.0.0.5:80".to_string()),
            },
        };
        ConfigLoader::save(&config).unwrap();
        let loaded = ConfigLoader::load().unwrap();
        assert_eq!(loaded.device.address.as_deref(), Some("10.0.0.5:80"));

        unsafe { std::env::remove_var("FIRMLINK_CONFIG_DIR") };
    }

    #[test]
    #[serial]
    fn load_without_a_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("FIRMLINK_CONFIG_DIR", dir.path()) };

        let loaded = ConfigLoader::load().unwrap();
        assert!(loaded.device.address.is_none());

        unsafe { std::env::remove_var("FIRMLINK_CONFIG_DIR") };
    }
}

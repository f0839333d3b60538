//! Config store for locating and loading fleetpkg.toml.

use std::path::{Path, PathBuf};

use super::{FleetConfig, parser};

pub const CONFIG_FILE_NAME: &str = "fleetpkg.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
    explicit: bool,
}

impl ConfigStore {
    /// The per-user config file, `<config dir>/fleetpkg/fleetpkg.toml`.
    pub fn from_default_location() -> anyhow::Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("fleetpkg");
        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            explicit: false,
        })
    }

    /// A file named on the command line; it must exist.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            explicit: true,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config. A missing default file yields the defaults.
    pub fn load(&self) -> anyhow::Result<FleetConfig> {
        if !self.explicit && !self.config_path.exists() {
            return Ok(FleetConfig::new());
        }
        parser::parse_config(&self.config_path)
    }
}

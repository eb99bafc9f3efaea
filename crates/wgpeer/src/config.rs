use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::service::ServiceManager;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/wgpeer/wgpeer.toml";

/// Site defaults. Every key is optional and command-line flags win.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WgpeerToml {
    pub syspath: PathBuf,
    pub interface: String,
    pub service_manager: ServiceManager,
    pub reload: bool,
}

impl Default for WgpeerToml {
    fn default() -> Self {
        Self {
            syspath: PathBuf::from("/etc/wireguard"),
            interface: "wg0".to_string(),
            service_manager: ServiceManager::default(),
            reload: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load(path: &Path) -> Result<WgpeerToml, ConfigError> {
    debug!(path = %path.display(), "loading config");

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config: WgpeerToml = toml::from_str(&contents)?;
            info!(
                path = %path.display(),
                syspath = %config.syspath.display(),
                interface = %config.interface,
                "loaded config"
            );
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, using defaults");
            Ok(WgpeerToml::default())
        }
        Err(e) => Err(ConfigError::Read(e)),
    }
}

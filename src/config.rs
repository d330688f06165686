//! Persisted station configuration.
//!
//! The JSON file is authoritative across restarts: stations registered
//! through the control API are written back into it, and every station
//! listed in it is registered at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

fn default_bridge_port() -> u16 {
    8256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub min_frequency: u64,
    pub max_frequency: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub hostname: String,
    pub port: u16,
    /// Advertised name on the wireless link.
    pub btname: String,
    /// Listener port for the wireless-stack bridge. Older configuration
    /// files omit it, so it defaults.
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,
    /// Known stations, keyed by link address.
    #[serde(default)]
    pub clients: BTreeMap<String, ClientConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn add_client(&mut self, address: &str, min_frequency: u64, max_frequency: u64) {
        self.clients.insert(
            address.to_string(),
            ClientConfig {
                min_frequency,
                max_frequency,
            },
        );
    }
}

//! Simulator configuration

use std::path::Path;

use meshsim_core::DEFAULT_TTL;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Configuration shared by a topology and the nodes created against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Hop budget for packets originated by nodes
    pub default_ttl: u8,
    /// Whether new nodes start with autonomous flood relay enabled
    pub flood_relay: bool,
    /// Emit a trace event for every packet arrival
    pub trace_routing: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            flood_relay: false,
            trace_routing: true,
        }
    }
}

impl SimConfig {
    /// Enable or disable flood relay for new nodes
    pub fn with_flood_relay(mut self, enabled: bool) -> Self {
        self.flood_relay = enabled;
        self
    }

    /// Set the hop budget for originated packets
    pub fn with_default_ttl(mut self, ttl: u8) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Parse a config from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

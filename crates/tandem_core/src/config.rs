//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Bridge settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub guest: GuestSettings,
    pub conversion: ConversionSettings,
}

/// Limits applied to the guest runtime when it is created. Unset limits
/// keep the engine's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestSettings {
    pub memory_limit: Option<usize>,
    pub max_stack_size: Option<usize>,
    pub gc_threshold: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Wrap values with no value mapping in a foreign handle. When off,
    /// such values are rejected as unsupported.
    pub wrap_opaque: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl BridgeConfig {
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self { wrap_opaque: true }
    }
}

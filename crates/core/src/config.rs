//! Runtime configuration for the hub and device bridge.

use crate::error::{Error, Result};
use crate::event::GridSize;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hub configuration. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Maximum bytes requested per inbound transfer.
    pub read_length: usize,
    /// Size reported by the hub until the device says otherwise.
    pub default_size: GridSize,
    /// Inbound endpoint number used when descriptors are unavailable.
    pub endpoint_in: u8,
    /// Outbound endpoint number used when descriptors are unavailable.
    pub endpoint_out: u8,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            read_length: 64,
            default_size: GridSize::default(),
            endpoint_in: 1,
            endpoint_out: 2,
        }
    }
}

impl GridConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| Error::Config(format!("parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_length == 0 {
            return Err(Error::Config("read_length must be at least 1".into()));
        }
        if !self.default_size.is_valid() {
            return Err(Error::Config(format!(
                "default_size must be at least 1x1, got {}",
                self.default_size
            )));
        }
        Ok(())
    }
}

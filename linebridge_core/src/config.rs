//! Session configuration, loaded from TOML.
//!
//! ```toml
//! [module]
//! path = "render.wasm"
//!
//! [raster]
//! width = 300
//! height = 150
//!
//! [arena]
//! pages = 2
//!
//! [limits]
//! fuel = 10_000_000
//! ```

use crate::arena::ArenaConfig;
use crate::error::{BridgeError, Result};
use crate::raster::Raster;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Path to the module binary, relative to the working directory
    pub path: Option<PathBuf>,
}

/// Execution limits applied to the module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Fuel granted per render; exhausting it aborts the render.
    pub fuel: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub module: ModuleConfig,
    pub raster: Raster,
    pub arena: ArenaConfig,
    pub limits: LimitsConfig,
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file. Relative module paths are resolved
    /// against the file's directory.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            BridgeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;

        if let (Some(module_path), Some(dir)) = (config.module.path.as_ref(), path.parent()) {
            if module_path.is_relative() {
                config.module.path = Some(dir.join(module_path));
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.arena.validate()?;
        self.raster
            .validate(self.arena.capacity())
            .map_err(|e| BridgeError::Config(e.to_string()))?;
        if self.limits.fuel == Some(0) {
            return Err(BridgeError::Config(
                "fuel limit must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

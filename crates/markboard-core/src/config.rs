//! Engine configuration.

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::viewport::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("history_capacity must be at least 1")]
    ZeroCapacity,
    #[error("Invalid zoom limits: min {min}, max {max}")]
    ZoomLimits { min: f64, max: f64 },
}

/// Tunables for one [`Whiteboard`](crate::Whiteboard).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of undo entries kept.
    pub history_capacity: usize,
    /// Compact soft-deleted shapes whenever a commit evicts history.
    pub auto_compact: bool,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            auto_compact: true,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            return Err(ConfigError::ZoomLimits {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        Ok(())
    }
}

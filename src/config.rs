// Configuration
// Model artifact locations and prediction timeout, stored as JSON

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::model::ModelArtifacts;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to get app data directory")]
    NoDataDir,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,
    /// Directory holding both artifacts; `None` means the app data directory
    pub model_dir: Option<PathBuf>,
    pub architecture_file: String,
    pub weights_file: String,
    /// 0 disables the timeout
    pub prediction_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            model_dir: None,
            architecture_file: "model_a1.json".to_string(),
            weights_file: "model_weights1.safetensors".to_string(),
            prediction_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Get the app data directory for speech-emotion
    pub fn default_config_dir() -> ConfigResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(data_dir.join("speech-emotion"))
    }

    pub fn default_config_path() -> ConfigResult<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    /// Get the default models directory
    pub fn default_models_dir() -> ConfigResult<PathBuf> {
        Ok(Self::default_config_dir()?.join("models"))
    }

    /// Load config from `path`, or defaults if the file does not exist
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from the default location; any failure falls back to defaults
    pub fn load_or_default() -> Self {
        match Self::default_config_path().and_then(|path| Self::load(&path)) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config, using default: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(io_err)
    }

    pub fn model_dir(&self) -> ConfigResult<PathBuf> {
        match &self.model_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_models_dir(),
        }
    }

    pub fn model_artifacts(&self) -> ConfigResult<ModelArtifacts> {
        Ok(ModelArtifacts::in_dir(
            &self.model_dir()?,
            &self.architecture_file,
            &self.weights_file,
        ))
    }

    pub fn prediction_timeout(&self) -> Option<Duration> {
        (self.prediction_timeout_secs > 0).then(|| Duration::from_secs(self.prediction_timeout_secs))
    }
}

//! Viewer configuration, read from `<config dir>/folio/config.toml`.

use crate::markup::MarkupStyle;
use log::{debug, info, LevelFilter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const APP_NAME: &str = "folio";
const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Zoom factor applied when a document opens
    pub initial_zoom: f32,
    /// Added or removed by one zoom in/out
    pub zoom_step: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub markup: MarkupStyle,
    pub http_timeout_secs: u64,
    pub max_document_bytes: u64,
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`
    pub log_level: String,
    /// Log to this file instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Locator opened at startup when none is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_source: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            initial_zoom: 1.5,
            zoom_step: 0.5,
            min_zoom: 0.25,
            max_zoom: 10.0,
            markup: MarkupStyle::default(),
            http_timeout_secs: 30,
            max_document_bytes: 256 * 1024 * 1024,
            log_level: "info".to_string(),
            log_file: None,
            default_source: None,
        }
    }
}

impl ViewerConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILENAME))
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &str, value: f32| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)))
            }
        };
        positive("min_zoom", self.min_zoom)?;
        positive("max_zoom", self.max_zoom)?;
        positive("zoom_step", self.zoom_step)?;
        positive("markup.line_width", self.markup.line_width)?;

        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "min_zoom {} exceeds max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if !(self.min_zoom..=self.max_zoom).contains(&self.initial_zoom) {
            return Err(ConfigError::Invalid(format!(
                "initial_zoom {} is outside [{}, {}]",
                self.initial_zoom, self.min_zoom, self.max_zoom
            )));
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level {:?}", self.log_level)))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

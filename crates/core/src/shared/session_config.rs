use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{DEFAULT_BASE_NAME, DEFAULT_FPS, DEFAULT_TIMEOUT_MS};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown property '{0}'")]
    UnknownProperty(String),
    #[error("invalid value '{value}' for property '{name}'")]
    InvalidValue { name: String, value: String },
}

/// User-facing tunables of the exporter.
///
/// Field names follow the host's property names when serialized, so a
/// JSON config file and `set_property` accept the same keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub frames_per_second: u32,
    #[serde(rename = "timeoutMilliseconds")]
    pub timeout_ms: u32,
    pub output_directory: PathBuf,
    #[serde(rename = "outputFileBaseName")]
    pub output_base_name: String,
    pub use_counter_suffix: bool,
    pub encoding_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frames_per_second: DEFAULT_FPS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            output_directory: default_output_directory(),
            output_base_name: DEFAULT_BASE_NAME.to_string(),
            use_counter_suffix: true,
            encoding_enabled: false,
        }
    }
}

fn default_output_directory() -> PathBuf {
    dirs::video_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies one property by its host-facing name.
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        };
        match name {
            "encodingEnabled" => self.encoding_enabled = parse_bool(value).ok_or_else(invalid)?,
            "useCounterSuffix" => self.use_counter_suffix = parse_bool(value).ok_or_else(invalid)?,
            "framesPerSecond" => {
                self.frames_per_second = value
                    .trim()
                    .parse()
                    .ok()
                    .filter(|fps| *fps > 0)
                    .ok_or_else(invalid)?;
            }
            "timeoutMilliseconds" => {
                self.timeout_ms = value.trim().parse().map_err(|_| invalid())?;
            }
            "outputFileBaseName" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                self.output_base_name = value.to_string();
            }
            "outputDirectory" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                self.output_directory = PathBuf::from(value);
            }
            _ => return Err(ConfigError::UnknownProperty(name.to_string())),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

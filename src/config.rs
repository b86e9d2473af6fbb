use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::telescope::channel::SshConfig;
use crate::telescope::DEFAULT_KEEP_OPEN;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub telescope: TelescopeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Directory holding the per-night queue files and reports.
    pub base_folder: PathBuf,
    /// Optional prefix for every file in the base folder.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelescopeConfig {
    /// Run telescope commands over ssh instead of a local shell.
    #[serde(default)]
    pub ssh: Option<SshConfig>,
    /// How long the dome may stay open unattended.
    #[serde(
        default = "default_keep_open",
        deserialize_with = "deserialize_duration"
    )]
    pub keep_open: Duration,
}

impl Default for TelescopeConfig {
    fn default() -> Self {
        Self {
            ssh: None,
            keep_open: default_keep_open(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:27748".to_string()
}

fn default_keep_open() -> Duration {
    DEFAULT_KEEP_OPEN
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

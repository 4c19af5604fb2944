use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::DEFAULT_USERNAME;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read file: {0}")]
    Read(#[from] std::io::Error),

    #[error("unmarshal file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("found target with empty address")]
    EmptyAddress,

    #[error("found target with empty password")]
    EmptyPassword,
}

/// Contents of the YAML configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Time budget of one poll cycle, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// A single Connect Box.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    #[serde(default, deserialize_with = "nullable")]
    pub addr: String,
    /// The device's default account is literally called `NULL`, which YAML
    /// reads as null.
    #[serde(default, deserialize_with = "nullable")]
    pub username: String,
    #[serde(default, deserialize_with = "nullable")]
    pub password: String,
}

fn nullable<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    pub fn read(path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read_to_string(path)?;

        Config::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Config, ConfigError> {
        let mut config: Config = serde_yaml::from_str(data)?;

        if config.timeout == 0 {
            config.timeout = DEFAULT_TIMEOUT_SECS;
        }
        for target in config.targets.iter_mut() {
            if target.addr.is_empty() {
                return Err(ConfigError::EmptyAddress);
            }
            if target.username.is_empty() {
                target.username = DEFAULT_USERNAME.to_string();
            }
            if target.password.is_empty() {
                return Err(ConfigError::EmptyPassword);
            }
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

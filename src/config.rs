use std::{path::PathBuf, time::Duration, time::SystemTime};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{dataset::Timescale, policy::duration_ms};

#[tracing::instrument(skip(path), err(Debug))]
pub async fn load_config<P: Into<PathBuf>>(path: P) -> Result<Config, Box<dyn std::error::Error>> {
    let path = path.into();
    let config = tokio::fs::read_to_string(path).await?;
    Config::from_yaml(&config)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// How often live feeds are re-fetched.
    #[serde(with = "duration_ms", default = "default_interval")]
    pub interval: Duration,

    /// How often the configuration file is checked for changes.
    #[serde(with = "duration_ms", default = "default_reload_interval")]
    pub reload_interval: Duration,

    #[serde(default)]
    pub zone: Option<String>,

    #[serde(default)]
    pub timescale: Timescale,

    /// Pins every feed to a fixed point in time instead of polling.
    #[serde(default)]
    pub custom_datetime: Option<DateTime<Utc>>,

    #[serde(default)]
    pub layers: LayersConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    pub fn from_yaml(source: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Config = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.interval.is_zero() {
            return Err("The fetch interval must be greater than zero.".into());
        }

        if self.reload_interval.is_zero() {
            return Err("The reload interval must be greater than zero.".into());
        }

        if self.client.version_check_interval.is_zero() {
            return Err("The client version check interval must be greater than zero.".into());
        }

        Ok(())
    }

    /// Loads the file at `path` if it was modified after `since`, returning
    /// the new configuration and its modification time.
    pub async fn load_if_modified_since<P: Into<PathBuf>>(
        path: P,
        since: SystemTime,
    ) -> Result<Option<(Self, SystemTime)>, Box<dyn std::error::Error>> {
        let path = path.into();
        let modified = tokio::fs::metadata(&path).await?.modified()?;
        if modified <= since {
            return Ok(None);
        }

        let config = load_config(path).await?;
        Ok(Some((config, modified)))
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LayersConfig {
    #[serde(default)]
    pub wind: bool,
    #[serde(default)]
    pub solar: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    #[default]
    Web,
    Mobile,
    Desktop,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default)]
    pub kind: ClientKind,

    #[serde(default)]
    pub localhost: bool,

    #[serde(with = "duration_ms", default = "default_version_check_interval")]
    pub version_check_interval: Duration,
}

impl ClientConfig {
    /// Only browser clients served from a real host look for newer versions.
    pub fn should_check_version(&self) -> bool {
        self.kind == ClientKind::Web && !self.localhost
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kind: ClientKind::default(),
            localhost: false,
            version_check_interval: default_version_check_interval(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_millis(5 * 60 * 1000)
}

fn default_reload_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_version_check_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

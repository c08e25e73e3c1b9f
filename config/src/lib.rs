// SPDX-License-Identifier: Apache-2.0

//! Gateway configuration model
//! Typed view of the YAML configuration file, with the validation applied
//! before any other component is brought up.

use ipnet::IpNet;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// The reasons why we may reject a configuration file
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    ReadFailed(String, String),
    #[error("Failed to parse config file: {0}")]
    ParseFailed(String),
    #[error("'{0}' is not a valid port")]
    BadPort(u16),
    #[error("Missing mandatory parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Subscriber '{0}' is registered twice for event '{1}'")]
    DuplicateSubscriber(String, String),
    #[error("Subscriber '{0}' has a zero channel size")]
    BadChannelSize(String),
    #[error("Subscriber '{0}' has a zero priority")]
    BadPriority(String),
}

/// Result-like type for configuration loading
pub type ConfigResult = Result<(), ConfigError>;

fn default_grpc_port() -> u16 {
    50151
}
fn default_http_port() -> u16 {
    8082
}
fn default_db_path() -> PathBuf {
    PathBuf::from("infra.db")
}
fn default_local_as() -> u32 {
    65000
}
fn default_channel_size() -> usize {
    32
}

/// FRR / Linux back-end options
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LinuxFrrConfig {
    pub enabled: bool,
    /// VTEP address used for bridges that do not carry one in their spec
    pub default_vtep: Option<IpNet>,
    #[serde(default = "default_local_as")]
    pub local_as: u32,
}
impl Default for LinuxFrrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_vtep: None,
            local_as: default_local_as(),
        }
    }
}

/// One back-end module registration: which events it consumes and at which
/// priority its component runs in each object's pipeline.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SubscriberConfig {
    pub name: String,
    pub events: Vec<String>,
    pub priority: u32,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
}

/// Top-level gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub tls_files: Option<String>,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub linux_frr: LinuxFrrConfig,
    #[serde(default)]
    pub subscribers: Vec<SubscriberConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grpc_port: default_grpc_port(),
            http_port: default_http_port(),
            tls_files: None,
            db_path: default_db_path(),
            linux_frr: LinuxFrrConfig::default(),
            subscribers: vec![],
        }
    }
}

impl Config {
    /// Load a [`Config`] from a YAML file and validate it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from {}...", path.display());
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        let config: Config =
            serde_yml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate a [`Config`].
    pub fn validate(&self) -> ConfigResult {
        if self.grpc_port == 0 {
            return Err(ConfigError::BadPort(self.grpc_port));
        }
        if self.http_port == 0 {
            return Err(ConfigError::BadPort(self.http_port));
        }
        for sub in &self.subscribers {
            if sub.name.is_empty() {
                return Err(ConfigError::MissingParameter("subscriber name"));
            }
            if sub.channel_size == 0 {
                return Err(ConfigError::BadChannelSize(sub.name.clone()));
            }
            if sub.priority == 0 {
                return Err(ConfigError::BadPriority(sub.name.clone()));
            }
            for event in &sub.events {
                let registrations = self
                    .subscribers
                    .iter()
                    .filter(|s| s.name == sub.name && s.events.contains(event))
                    .count();
                if registrations > 1 {
                    return Err(ConfigError::DuplicateSubscriber(
                        sub.name.clone(),
                        event.clone(),
                    ));
                }
            }
        }
        Ok(())
    }
}

//! Scheduler configuration (`lbgrid.toml`).
//!
//! Every section is optional; missing values fall back to the stock
//! HAProxy backend and a per-device limit of
//! [`DEFAULT_RESOURCE_LIMIT`](crate::DEFAULT_RESOURCE_LIMIT).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DEFAULT_RESOURCE_LIMIT, DriverIdentity, HAPROXY, HAPROXY_VERSION, LOADBALANCER};

/// Errors raised by [`SchedulerConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("placement.resource_limit must be at least 1")]
    ZeroResourceLimit,

    #[error("placement.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("backend.{0} must not be empty")]
    EmptyBackendField(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub backend: BackendConfig,
    pub placement: PlacementConfig,
    pub store: StoreConfig,
}

/// Backend used when a fresh device has to be provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub service_type: String,
    pub device_type: String,
    pub version: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            service_type: LOADBALANCER.to_string(),
            device_type: HAPROXY.to_string(),
            version: HAPROXY_VERSION.to_string(),
        }
    }
}

impl BackendConfig {
    pub fn identity(&self) -> DriverIdentity {
        DriverIdentity::new(&self.service_type, &self.device_type, &self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Maximum number of resources associated with one device.
    pub resource_limit: u32,
    /// How many times `schedule` retries after losing a race.
    pub max_attempts: u32,
    /// Only place onto existing devices of this type.
    pub device_type: Option<String>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            resource_limit: DEFAULT_RESOURCE_LIMIT,
            max_attempts: 3,
            device_type: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; defaults to `lbgrid.redb` under the data directory.
    pub path: Option<PathBuf>,
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.placement.resource_limit == 0 {
            return Err(ConfigError::ZeroResourceLimit);
        }
        if self.placement.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        for (field, value) in [
            ("service_type", &self.backend.service_type),
            ("device_type", &self.backend.device_type),
            ("version", &self.backend.version),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyBackendField(field));
            }
        }
        Ok(())
    }
}

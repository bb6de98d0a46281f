//! Placement policy and its conversion from scheduler configuration.

use serde::{Deserialize, Serialize};

use lbgrid_core::{DEFAULT_RESOURCE_LIMIT, PlacementConfig};

/// Knobs that constrain which devices a resource may land on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    /// A device holding this many resources is saturated.
    pub resource_limit: u32,
    /// Restrict placement to devices of this type.
    pub device_type: Option<String>,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            resource_limit: DEFAULT_RESOURCE_LIMIT,
            device_type: None,
        }
    }
}

impl PlacementPolicy {
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }
}

impl From<&PlacementConfig> for PlacementPolicy {
    fn from(config: &PlacementConfig) -> Self {
        Self {
            resource_limit: config.resource_limit,
            device_type: config.device_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_uses_stock_limit() {
        let policy = PlacementPolicy::default();
        assert_eq!(policy.resource_limit, 10);
        assert!(policy.device_type.is_none());
    }

    #[test]
    fn converts_from_config() {
        let config = PlacementConfig {
            resource_limit: 4,
            max_attempts: 2,
            device_type: Some("HAPROXY".to_string()),
        };
        let policy = PlacementPolicy::from(&config);
        assert_eq!(policy.resource_limit, 4);
        assert_eq!(policy.device_type.as_deref(), Some("HAPROXY"));
    }
}

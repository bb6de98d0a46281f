//! Shared types used across lbgrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Service type tag for load-balancing drivers.
pub const LOADBALANCER: &str = "LOADBALANCER";

/// Device type of the default software balancer.
pub const HAPROXY: &str = "HAPROXY";

/// Driver version of the default software balancer.
pub const HAPROXY_VERSION: &str = "v1.0";

/// Resources a single device may host before it counts as saturated.
pub const DEFAULT_RESOURCE_LIMIT: u32 = 10;

/// Identifies the driver that controls a class of devices.
///
/// Control messages for a device are routed to the driver whose identity
/// matches the device's `type` and `version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverIdentity {
    pub service_type: String,
    pub device_type: String,
    pub version: String,
}

impl DriverIdentity {
    pub fn new(
        service_type: impl Into<String>,
        device_type: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            service_type: service_type.into(),
            device_type: device_type.into(),
            version: version.into(),
        }
    }

    /// Identity of the stock HAProxy driver.
    pub fn haproxy() -> Self {
        Self::new(LOADBALANCER, HAPROXY, HAPROXY_VERSION)
    }
}

impl fmt::Display for DriverIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.service_type, self.device_type, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_display_joins_with_colons() {
        assert_eq!(
            DriverIdentity::haproxy().to_string(),
            "LOADBALANCER:HAPROXY:v1.0"
        );
    }

    #[test]
    fn identities_compare_by_all_fields() {
        let a = DriverIdentity::new(LOADBALANCER, HAPROXY, "v1.0");
        let b = DriverIdentity::new(LOADBALANCER, HAPROXY, "v2.0");
        assert_ne!(a, b);
        assert_eq!(a, DriverIdentity::haproxy());
    }
}

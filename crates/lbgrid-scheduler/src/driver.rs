//! Device drivers and the registry that routes devices to them.
//!
//! Drivers are registered once at startup under their [`DriverIdentity`];
//! a device is served by the driver matching its `type` and `version`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use lbgrid_core::{DriverIdentity, LOADBALANCER};
use lbgrid_state::BalancerDevice;

use crate::error::{SchedulerError, SchedulerResult};

/// What a driver did with a provisioning or teardown command.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverResponse {
    /// Finished synchronously; carries the device's management info.
    Completed(serde_json::Value),
    /// Accepted; the outcome arrives later as a device confirmation.
    Deferred,
}

/// Control surface of one backend implementation.
pub trait DeviceDriver: Send + Sync {
    fn identity(&self) -> DriverIdentity;

    /// Bring up the backend for a `PENDING_CREATE` device.
    fn provision(&self, device: &BalancerDevice) -> Result<DriverResponse, String>;

    /// Tear down the backend for a `PENDING_DELETE` device.
    fn teardown(&self, device: &BalancerDevice) -> Result<DriverResponse, String>;
}

/// Driver for devices whose commands are carried out by an external agent.
///
/// Never completes anything itself: the agent reports back through the
/// confirmation endpoint once the backend is up or gone.
pub struct ExternalDriver {
    identity: DriverIdentity,
}

impl ExternalDriver {
    pub fn new(identity: DriverIdentity) -> Self {
        Self { identity }
    }
}

impl DeviceDriver for ExternalDriver {
    fn identity(&self) -> DriverIdentity {
        self.identity.clone()
    }

    fn provision(&self, device: &BalancerDevice) -> Result<DriverResponse, String> {
        debug!(device_id = %device.id, driver = %self.identity, "provisioning deferred to agent");
        Ok(DriverResponse::Deferred)
    }

    fn teardown(&self, device: &BalancerDevice) -> Result<DriverResponse, String> {
        debug!(device_id = %device.id, driver = %self.identity, "teardown deferred to agent");
        Ok(DriverResponse::Deferred)
    }
}

#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<DriverIdentity, Arc<dyn DeviceDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver. Two drivers may not share an identity.
    pub fn register(&mut self, driver: Arc<dyn DeviceDriver>) -> SchedulerResult<()> {
        let identity = driver.identity();
        if self.drivers.contains_key(&identity) {
            return Err(SchedulerError::DuplicateDriver(identity.to_string()));
        }
        info!(driver = %identity, "device driver registered");
        self.drivers.insert(identity, driver);
        Ok(())
    }

    pub fn get(&self, identity: &DriverIdentity) -> SchedulerResult<Arc<dyn DeviceDriver>> {
        self.drivers
            .get(identity)
            .cloned()
            .ok_or_else(|| SchedulerError::DriverNotFound(identity.to_string()))
    }

    /// The load-balancing driver that controls `device`.
    pub fn driver_for(&self, device: &BalancerDevice) -> SchedulerResult<Arc<dyn DeviceDriver>> {
        self.get(&DriverIdentity::new(
            LOADBALANCER,
            &device.device_type,
            &device.version,
        ))
    }

    pub fn contains(&self, identity: &DriverIdentity) -> bool {
        self.drivers.contains_key(identity)
    }

    /// Registered identities, sorted for stable output.
    pub fn identities(&self) -> Vec<DriverIdentity> {
        let mut ids: Vec<_> = self.drivers.keys().cloned().collect();
        ids.sort_by_key(|id| id.to_string());
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbgrid_state::DeviceStatus;

    fn device(device_type: &str, version: &str) -> BalancerDevice {
        BalancerDevice {
            id: "d1".to_string(),
            name: "d1".to_string(),
            device_type: device_type.to_string(),
            version: version.to_string(),
            management: serde_json::Value::Null,
            tenant_id: "t1".to_string(),
            subnet_id: None,
            ref_counter: 0,
            status: DeviceStatus::PendingCreate,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn routes_device_to_matching_driver() {
        let mut registry = DriverRegistry::new();
        registry
            .register(Arc::new(ExternalDriver::new(DriverIdentity::haproxy())))
            .unwrap();

        let driver = registry.driver_for(&device("HAPROXY", "v1.0")).unwrap();
        assert_eq!(driver.identity(), DriverIdentity::haproxy());
    }

    #[test]
    fn unknown_version_is_driver_not_found() {
        let mut registry = DriverRegistry::new();
        registry
            .register(Arc::new(ExternalDriver::new(DriverIdentity::haproxy())))
            .unwrap();

        let err = registry.driver_for(&device("HAPROXY", "v2.0")).err().unwrap();
        assert!(matches!(err, SchedulerError::DriverNotFound(ref name) if name == "LOADBALANCER:HAPROXY:v2.0"));
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut registry = DriverRegistry::new();
        registry
            .register(Arc::new(ExternalDriver::new(DriverIdentity::haproxy())))
            .unwrap();
        let result = registry.register(Arc::new(ExternalDriver::new(DriverIdentity::haproxy())));
        assert!(matches!(result, Err(SchedulerError::DuplicateDriver(_))));
        assert_eq!(registry.identities().len(), 1);
    }

    #[test]
    fn external_driver_defers() {
        let driver = ExternalDriver::new(DriverIdentity::haproxy());
        let d = device("HAPROXY", "v1.0");
        assert_eq!(driver.provision(&d), Ok(DriverResponse::Deferred));
        assert_eq!(driver.teardown(&d), Ok(DriverResponse::Deferred));
    }
}

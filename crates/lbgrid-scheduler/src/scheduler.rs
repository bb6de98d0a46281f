//! Balancer scheduler — maps logical resources onto balancer devices.
//!
//! The `BalancerScheduler` is the entry point for callers that own
//! resources (VIPs, pools, members). It:
//! - Places a resource on the least-loaded eligible device
//! - Creates a fresh `PENDING_CREATE` device when nothing qualifies
//! - Releases associations and reports devices that need teardown
//! - Applies device confirmations coming back from drivers and agents
//!
//! All state lives in the device store; the scheduler itself is stateless
//! and safe to share behind an `Arc`.

use tracing::{debug, error, info, warn};

use lbgrid_core::{BackendConfig, SchedulerConfig};
use lbgrid_placement::{PlacementPolicy, select};
use lbgrid_state::*;

use crate::confirmation::{ConfirmOutcome, ConfirmStatus, DeviceConfirmation};
use crate::device_manager::DeviceManager;
use crate::driver::DriverRegistry;
use crate::error::{SchedulerError, SchedulerResult};

pub struct BalancerScheduler {
    manager: DeviceManager,
    policy: PlacementPolicy,
    /// Type and version stamped on freshly created devices.
    backend: BackendConfig,
    max_attempts: u32,
}

impl BalancerScheduler {
    /// Create a scheduler over `store`.
    ///
    /// Fails with `DriverNotFound` when the configured backend has no
    /// registered driver, since every device it creates would be orphaned.
    pub fn new(store: DeviceStore, config: &SchedulerConfig, registry: &DriverRegistry) -> SchedulerResult<Self> {
        config
            .validate()
            .map_err(|e| SchedulerError::Validation(e.to_string()))?;

        let identity = config.backend.identity();
        if !registry.contains(&identity) {
            return Err(SchedulerError::DriverNotFound(identity.to_string()));
        }

        let store = store.with_resource_limit(config.placement.resource_limit);
        Ok(Self::from_parts(DeviceManager::new(store), config))
    }

    /// Assemble a scheduler around an existing manager. The store's own
    /// resource limit is left as is.
    pub(crate) fn from_parts(manager: DeviceManager, config: &SchedulerConfig) -> Self {
        info!(
            backend = %config.backend.identity(),
            resource_limit = manager.store().resource_limit(),
            max_attempts = config.placement.max_attempts,
            "balancer scheduler ready"
        );

        Self {
            manager,
            policy: PlacementPolicy::from(&config.placement),
            backend: config.backend.clone(),
            max_attempts: config.placement.max_attempts,
        }
    }

    pub fn manager(&self) -> &DeviceManager {
        &self.manager
    }

    /// Associate `resource` with a device, creating one if needed.
    ///
    /// Single attempt: a lost race surfaces as a retryable
    /// `AssociationError`. Returns the device as stored after the
    /// association, so its `ref_counter` already counts `resource`.
    pub fn add_resource_association(&self, resource: &ResourceRef) -> SchedulerResult<BalancerDevice> {
        debug!(resource_id = %resource.id, tenant_id = %resource.tenant_id, "scheduling resource");

        match self.manager.store().get_association(&resource.id) {
            Ok(assoc) => {
                return Err(SchedulerError::AlreadyAssociated(format!(
                    "{} -> {}",
                    assoc.resource_id, assoc.device_id
                )));
            }
            Err(StateError::AssociationNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let devices = self.manager.get_device_list()?;
        let (device, fresh) = match select(resource, &devices, &self.policy).into_device() {
            Some(device) => (device, false),
            None => {
                info!(
                    resource_id = %resource.id,
                    device_type = %self.backend.device_type,
                    "no valid device found, creating a new one"
                );
                let device = self.manager.create_device(&self.default_descriptor(resource))?;
                (device, true)
            }
        };

        if let Err(err) = self.manager.add_association(&device, resource) {
            if fresh {
                self.discard(&device);
            }
            return Err(match err {
                SchedulerError::NoValidDevice(_) => SchedulerError::AssociationError(format!(
                    "device {} no longer serves resource {}",
                    device.id, resource.id
                )),
                other => other,
            });
        }

        let device = self.manager.get_device(&device.id).map_err(|e| match e {
            SchedulerError::NotFound(_) => {
                SchedulerError::AssociationError(format!("device {} removed after association", device.id))
            }
            other => other,
        })?;
        info!(
            resource_id = %resource.id,
            device_id = %device.id,
            ref_counter = device.ref_counter,
            "resource placed"
        );
        Ok(device)
    }

    /// Release a resource's association. The returned device is
    /// `PENDING_DELETE` if it no longer serves anything.
    pub fn delete_resource_association(&self, resource_id: &str) -> SchedulerResult<BalancerDevice> {
        let device = self.manager.delete_association(resource_id)?;
        if device.status == DeviceStatus::PendingDelete {
            info!(%resource_id, device_id = %device.id, "device no longer serves any resource");
        }
        Ok(device)
    }

    pub fn get_device_by_resource(&self, resource_id: &str) -> SchedulerResult<BalancerDevice> {
        self.manager.get_device_by_resource(resource_id)
    }

    pub fn get_device_list(&self) -> SchedulerResult<Vec<BalancerDevice>> {
        self.manager.get_device_list()
    }

    pub fn get_device(&self, device_id: &str) -> SchedulerResult<BalancerDevice> {
        self.manager.get_device(device_id)
    }

    /// Persist a device; `ERROR` deletes it and yields `None`.
    pub fn update_device(&self, device: &BalancerDevice) -> SchedulerResult<Option<BalancerDevice>> {
        self.manager.update_device(device)
    }

    /// Remove a device and its associations. Idempotent.
    pub fn delete_device(&self, device_id: &str) -> SchedulerResult<bool> {
        self.manager.delete_device(device_id)
    }

    /// Place `resource`, retrying placement after lost races.
    pub fn schedule_device(&self, resource: &ResourceRef) -> SchedulerResult<BalancerDevice> {
        self.with_retries(&resource.id, || self.add_resource_association(resource))
    }

    /// Run `op` until it succeeds, fails for good, or `max_attempts` runs out.
    fn with_retries<T>(
        &self,
        resource_id: &str,
        mut op: impl FnMut() -> SchedulerResult<T>,
    ) -> SchedulerResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(%resource_id, attempt, error = %e, "placement raced, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Place `resource` and return the id of the device serving it.
    pub fn schedule(&self, resource: &ResourceRef) -> SchedulerResult<DeviceId> {
        self.schedule_device(resource).map(|device| device.id)
    }

    /// Release `resource_id`. Returns the device id when the device is left
    /// without resources and needs teardown.
    pub fn unschedule(&self, resource_id: &str) -> SchedulerResult<Option<DeviceId>> {
        let device = self.delete_resource_association(resource_id)?;
        Ok((device.status == DeviceStatus::PendingDelete).then_some(device.id))
    }

    /// Apply a driver's verdict on a device.
    ///
    /// `OK` on a `PENDING_DELETE` device confirms teardown and removes it.
    /// Otherwise `OK` activates the device and `ERROR` deletes it. The
    /// decision and the write happen in one store transaction, so a
    /// release racing with a late provisioning verdict cannot leave an
    /// idle device `ACTIVE`.
    pub fn on_device_confirmation(
        &self,
        device_id: &str,
        status: ConfirmStatus,
        management: Option<serde_json::Value>,
    ) -> SchedulerResult<ConfirmOutcome> {
        debug!(%device_id, ?status, "device confirmation");
        let confirmed = self
            .manager
            .confirm_device(device_id, status == ConfirmStatus::Ok, management)?;
        Ok(match confirmed {
            Some(device) => ConfirmOutcome::Updated(device),
            None => ConfirmOutcome::Deleted(device_id.to_string()),
        })
    }

    pub fn apply_confirmation(&self, confirmation: &DeviceConfirmation) -> SchedulerResult<ConfirmOutcome> {
        if confirmation.status == ConfirmStatus::Error && !confirmation.message.is_empty() {
            warn!(device_id = %confirmation.device_id, message = %confirmation.message, "device reported an error");
        }
        self.on_device_confirmation(
            &confirmation.device_id,
            confirmation.status,
            confirmation.management.clone(),
        )
    }

    fn default_descriptor(&self, resource: &ResourceRef) -> DeviceDescriptor {
        DeviceDescriptor {
            name: uuid::Uuid::new_v4().to_string(),
            device_type: self.backend.device_type.clone(),
            version: self.backend.version.clone(),
            management: serde_json::Value::Null,
            tenant_id: resource.tenant_id.clone(),
            subnet_id: resource.subnet_id.clone(),
            status: DeviceStatus::PendingCreate,
        }
    }

    /// Drop a device created for an association that did not happen.
    fn discard(&self, device: &BalancerDevice) {
        if let Err(e) = self.manager.delete_device(&device.id) {
            error!(device_id = %device.id, error = %e, "failed to discard unused device");
        }
    }
}

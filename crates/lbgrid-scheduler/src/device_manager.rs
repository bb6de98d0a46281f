//! Device manager — capacity policy on top of the device store.
//!
//! Holds no state between calls: every change goes through one of the
//! store's atomic primitives. Ordering contract for teardown:
//! `delete_association` must run before `update_device`/`delete_device`
//! for the same device, since it is the only path that drives the
//! reference counter to zero and flips the device to `PENDING_DELETE`.

use tracing::{debug, info, warn};

use lbgrid_state::*;

use crate::error::{SchedulerError, SchedulerResult};

pub struct DeviceManager {
    store: DeviceStore,
}

impl DeviceManager {
    pub fn new(store: DeviceStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    /// Create a device from a complete descriptor.
    pub fn create_device(&self, descriptor: &DeviceDescriptor) -> SchedulerResult<BalancerDevice> {
        debug!(name = %descriptor.name, tenant_id = %descriptor.tenant_id, "creating device");
        Ok(self.store.create_device(descriptor)?)
    }

    /// Associate `resource` with `device`, bumping its reference counter.
    ///
    /// Re-checks the tenant/subnet scope even though placement already
    /// filtered on it; the store checks once more inside its transaction.
    pub fn add_association(
        &self,
        device: &BalancerDevice,
        resource: &ResourceRef,
    ) -> SchedulerResult<ResourceAssociation> {
        if !device.serves_scope_of(resource) {
            return Err(SchedulerError::NoValidDevice(resource.id.clone()));
        }
        debug!(resource_id = %resource.id, device_id = %device.id, "adding resource to device");
        Ok(self.store.add_association(&device.id, resource)?)
    }

    /// Drop a resource's association; may leave the device `PENDING_DELETE`.
    pub fn delete_association(&self, resource_id: &str) -> SchedulerResult<BalancerDevice> {
        Ok(self.store.delete_association(resource_id)?)
    }

    /// Persist a device's management info and status.
    ///
    /// A device reported in `ERROR` is deleted instead of updated; the
    /// return value is `None` in that case.
    pub fn update_device(&self, device: &BalancerDevice) -> SchedulerResult<Option<BalancerDevice>> {
        if device.status == DeviceStatus::Error {
            warn!(device_id = %device.id, "deleting device in ERROR state");
            self.delete_device(&device.id)?;
            return Ok(None);
        }

        let patch = DevicePatch {
            management: Some(device.management.clone()),
            status: Some(device.status),
        };
        let updated = self.store.update_device(&device.id, &patch)?;
        debug!(device_id = %updated.id, status = %updated.status, "device updated");
        Ok(Some(updated))
    }

    /// Record a driver verdict. `None` means the device was removed.
    ///
    /// The status decision is made against the stored row inside the
    /// store's transaction, never against a caller's copy.
    pub fn confirm_device(
        &self,
        device_id: &str,
        succeeded: bool,
        management: Option<serde_json::Value>,
    ) -> SchedulerResult<Option<BalancerDevice>> {
        let confirmed = self.store.confirm_device(device_id, succeeded, management)?;
        if confirmed.is_none() && !succeeded {
            warn!(%device_id, "deleting device reported in ERROR state");
        }
        Ok(confirmed)
    }

    /// Remove a device together with any association still pointing at it.
    ///
    /// Returns false if the device was already gone.
    pub fn delete_device(&self, device_id: &str) -> SchedulerResult<bool> {
        let existed = self.store.delete_device(device_id)?;
        if existed {
            info!(%device_id, "device deleted");
        }
        Ok(existed)
    }

    /// All devices, without ownership filtering.
    pub fn get_device_list(&self) -> SchedulerResult<Vec<BalancerDevice>> {
        Ok(self.store.list_devices()?)
    }

    pub fn get_device(&self, device_id: &str) -> SchedulerResult<BalancerDevice> {
        self.store
            .get_device(device_id)?
            .ok_or_else(|| SchedulerError::NotFound(format!("device {device_id}")))
    }

    /// The device currently serving a resource.
    pub fn get_device_by_resource(&self, resource_id: &str) -> SchedulerResult<BalancerDevice> {
        Ok(self.store.device_for_resource(resource_id)?)
    }
}

//! DeviceStore — redb-backed persistence for balancer devices.
//!
//! Provides typed CRUD over devices plus the two compound primitives the
//! scheduler is built on: `add_association` and `delete_association`.
//! Each compound operation runs in one write transaction through
//! [`DeviceStore::write`], which commits on success and aborts on error.
//! The store supports both on-disk and in-memory backends (the latter
//! for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lbgrid_core::DEFAULT_RESOURCE_LIMIT;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Thread-safe device store backed by redb.
#[derive(Clone)]
pub struct DeviceStore {
    db: Arc<Database>,
    resource_limit: u32,
}

impl DeviceStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db)?;
        debug!(?path, "device store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db)?;
        debug!("in-memory device store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> StateResult<Self> {
        let store = Self {
            db: Arc::new(db),
            resource_limit: DEFAULT_RESOURCE_LIMIT,
        };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Cap the number of associations a single device accepts.
    ///
    /// Enforced inside `add_association`, so concurrent callers racing
    /// for the same device cannot push it past the limit.
    pub fn with_resource_limit(mut self, limit: u32) -> Self {
        self.resource_limit = limit;
        self
    }

    pub fn resource_limit(&self) -> u32 {
        self.resource_limit
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        self.write(|txn| {
            // Opening a table in a write transaction creates it if absent.
            txn.open_table(DEVICES).map_err(map_err!(Table))?;
            txn.open_table(ASSOCIATIONS).map_err(map_err!(Table))?;
            Ok(())
        })
    }

    /// Run `op` as one unit of work: commit if it succeeds, abort otherwise.
    fn write<T>(&self, op: impl FnOnce(&WriteTransaction) -> StateResult<T>) -> StateResult<T> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        match op(&txn) {
            Ok(value) => {
                txn.commit().map_err(map_err!(Transaction))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    warn!(error = %abort, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }

    // ── Devices ────────────────────────────────────────────────────

    /// Persist a new device with a freshly generated id.
    pub fn create_device(&self, descriptor: &DeviceDescriptor) -> StateResult<BalancerDevice> {
        descriptor.validate().map_err(StateError::Validation)?;

        let now = epoch_secs();
        let device = BalancerDevice {
            id: Uuid::new_v4().to_string(),
            name: descriptor.name.clone(),
            device_type: descriptor.device_type.clone(),
            version: descriptor.version.clone(),
            management: descriptor.management.clone(),
            tenant_id: descriptor.tenant_id.clone(),
            subnet_id: descriptor.subnet_id.clone(),
            ref_counter: 0,
            status: descriptor.status,
            created_at: now,
            updated_at: now,
        };
        let value = encode(&device)?;

        self.write(|txn| {
            let mut devices = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            devices
                .insert(device.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            Ok(())
        })?;
        info!(device_id = %device.id, tenant_id = %device.tenant_id, status = %device.status, "device created");
        Ok(device)
    }

    /// Get a device by id.
    pub fn get_device(&self, device_id: &str) -> StateResult<Option<BalancerDevice>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let devices = txn.open_table(DEVICES).map_err(map_err!(Table))?;
        match devices.get(device_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Apply a management/status patch. Other fields are immutable.
    ///
    /// A drained device (`PENDING_DELETE` with no references) cannot be
    /// patched back to `ACTIVE`; that fails with `InvalidTransition`.
    pub fn update_device(&self, device_id: &str, patch: &DevicePatch) -> StateResult<BalancerDevice> {
        let device = self.write(|txn| {
            let mut devices = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            let mut device: BalancerDevice = match devices.get(device_id).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(format!("device {device_id}"))),
            };

            if patch.status == Some(DeviceStatus::Active)
                && device.status == DeviceStatus::PendingDelete
                && device.ref_counter == 0
            {
                return Err(StateError::InvalidTransition(format!(
                    "device {device_id} is drained and cannot become ACTIVE"
                )));
            }
            if let Some(management) = &patch.management {
                device.management = management.clone();
            }
            if let Some(status) = patch.status {
                device.status = status;
            }
            device.updated_at = epoch_secs();

            let value = encode(&device)?;
            devices
                .insert(device_id, value.as_slice())
                .map_err(map_err!(Write))?;
            Ok(device)
        })?;
        debug!(%device_id, status = %device.status, "device updated");
        Ok(device)
    }

    /// Apply a driver's verdict on a device in one transaction.
    ///
    /// The device is removed, associations included, when the verdict is a
    /// failure or when it acknowledges teardown of a `PENDING_DELETE`
    /// device. Otherwise it becomes `ACTIVE` and takes `management` if
    /// given. Returns `None` when the device was removed.
    pub fn confirm_device(
        &self,
        device_id: &str,
        succeeded: bool,
        management: Option<serde_json::Value>,
    ) -> StateResult<Option<BalancerDevice>> {
        let outcome = self.write(|txn| {
            let mut devices = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            let mut device: BalancerDevice = match devices.get(device_id).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(format!("device {device_id}"))),
            };

            if !succeeded || device.status == DeviceStatus::PendingDelete {
                drop(devices);
                let orphans = remove_device(txn, device_id)?;
                return Ok((None, device.status, orphans));
            }

            let previous = device.status;
            device.status = DeviceStatus::Active;
            if let Some(management) = management {
                device.management = management;
            }
            device.updated_at = epoch_secs();
            devices
                .insert(device_id, encode(&device)?.as_slice())
                .map_err(map_err!(Write))?;
            Ok((Some(device), previous, Some(0)))
        })?;

        let (device, previous, orphans) = outcome;
        match &device {
            Some(device) => debug!(%device_id, from = %previous, status = %device.status, "device confirmed"),
            None => info!(%device_id, from = %previous, succeeded, orphans, "device removed on confirmation"),
        }
        Ok(device)
    }

    /// Delete a device and every association still pointing at it.
    ///
    /// Returns true if the device existed; deleting an absent device is a no-op.
    pub fn delete_device(&self, device_id: &str) -> StateResult<bool> {
        let orphans = self.write(|txn| remove_device(txn, device_id))?;

        if let Some(orphans) = orphans.filter(|n| *n > 0) {
            warn!(%device_id, orphans, "deleted device still had associations");
        }
        debug!(%device_id, existed = orphans.is_some(), "device deleted");
        Ok(orphans.is_some())
    }

    /// List all devices, ordered by id.
    pub fn list_devices(&self) -> StateResult<Vec<BalancerDevice>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let devices = txn.open_table(DEVICES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in devices.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Associations ───────────────────────────────────────────────

    /// Get the association recorded for a resource.
    pub fn get_association(&self, resource_id: &str) -> StateResult<ResourceAssociation> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let associations = txn.open_table(ASSOCIATIONS).map_err(map_err!(Table))?;
        match associations.get(resource_id).map_err(map_err!(Read))? {
            Some(guard) => decode(guard.value()),
            None => Err(StateError::AssociationNotFound(resource_id.to_string())),
        }
    }

    /// Resolve the device serving a resource from one consistent snapshot.
    pub fn device_for_resource(&self, resource_id: &str) -> StateResult<BalancerDevice> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let associations = txn.open_table(ASSOCIATIONS).map_err(map_err!(Table))?;
        let assoc: ResourceAssociation = match associations.get(resource_id).map_err(map_err!(Read))? {
            Some(guard) => decode(guard.value())?,
            None => {
                return Err(StateError::AssociationNotFound(resource_id.to_string()));
            }
        };

        let devices = txn.open_table(DEVICES).map_err(map_err!(Table))?;
        match devices.get(assoc.device_id.as_str()).map_err(map_err!(Read))? {
            Some(guard) => decode(guard.value()),
            None => Err(StateError::Inconsistent(format!(
                "association {resource_id} points at missing device {}",
                assoc.device_id
            ))),
        }
    }

    /// List every association, ordered by resource id.
    pub fn list_associations(&self) -> StateResult<Vec<ResourceAssociation>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let associations = txn.open_table(ASSOCIATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in associations.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// List the associations that point at a device.
    pub fn list_associations_for_device(&self, device_id: &str) -> StateResult<Vec<ResourceAssociation>> {
        Ok(self
            .list_associations()?
            .into_iter()
            .filter(|assoc| assoc.device_id == device_id)
            .collect())
    }

    /// Associate a resource with a device and bump the device's counter.
    ///
    /// The device is re-read inside the transaction. If it vanished, is
    /// being torn down, is saturated, or no longer matches the resource's
    /// tenant/subnet, the call fails with [`StateError::Association`] and
    /// nothing is written; the caller should retry placement.
    pub fn add_association(&self, device_id: &str, resource: &ResourceRef) -> StateResult<ResourceAssociation> {
        let limit = self.resource_limit;
        let (assoc, ref_counter) = self.write(|txn| {
            let mut devices = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            let mut associations = txn.open_table(ASSOCIATIONS).map_err(map_err!(Table))?;

            let mut device: BalancerDevice = match devices.get(device_id).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => {
                    return Err(StateError::Association(format!("device {device_id} no longer exists")));
                }
            };
            if !device.status.accepts_associations() {
                return Err(StateError::Association(format!(
                    "device {device_id} is {}",
                    device.status
                )));
            }
            if device.ref_counter >= limit {
                return Err(StateError::Association(format!(
                    "device {device_id} is saturated ({}/{limit})",
                    device.ref_counter
                )));
            }
            if !device.serves_scope_of(resource) {
                return Err(StateError::Association(format!(
                    "device {device_id} is bound to another tenant or subnet"
                )));
            }
            if associations
                .get(resource.id.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                return Err(StateError::Conflict(resource.id.clone()));
            }

            let now = epoch_secs();
            let assoc = ResourceAssociation {
                resource_id: resource.id.clone(),
                device_id: device_id.to_string(),
                created_at: now,
            };
            associations
                .insert(resource.id.as_str(), encode(&assoc)?.as_slice())
                .map_err(map_err!(Write))?;

            device.ref_counter += 1;
            device.tenant_id = resource.tenant_id.clone();
            if resource.subnet_id.is_some() {
                device.subnet_id = resource.subnet_id.clone();
            }
            device.updated_at = now;
            devices
                .insert(device_id, encode(&device)?.as_slice())
                .map_err(map_err!(Write))?;

            Ok((assoc, device.ref_counter))
        })?;

        debug!(resource_id = %assoc.resource_id, %device_id, ref_counter, "association added");
        Ok(assoc)
    }

    /// Remove a resource's association and decrement its device's counter.
    ///
    /// When the counter reaches zero the device moves to `PENDING_DELETE`.
    /// Returns the device as it stands after the change.
    pub fn delete_association(&self, resource_id: &str) -> StateResult<BalancerDevice> {
        let device = self.write(|txn| {
            let mut devices = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            let mut associations = txn.open_table(ASSOCIATIONS).map_err(map_err!(Table))?;

            let assoc: ResourceAssociation = match associations.remove(resource_id).map_err(map_err!(Write))? {
                Some(guard) => decode(guard.value())?,
                None => {
                    return Err(StateError::AssociationNotFound(resource_id.to_string()));
                }
            };

            let device_id = assoc.device_id.as_str();
            let mut device: BalancerDevice = match devices.get(device_id).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(format!("device {device_id}"))),
            };

            device.ref_counter = device.ref_counter.checked_sub(1).ok_or_else(|| {
                StateError::Inconsistent(format!("device {device_id} has no references to release"))
            })?;
            if device.ref_counter == 0 {
                device.status = DeviceStatus::PendingDelete;
            }
            device.updated_at = epoch_secs();
            devices
                .insert(device_id, encode(&device)?.as_slice())
                .map_err(map_err!(Write))?;
            Ok(device)
        })?;

        debug!(
            %resource_id,
            device_id = %device.id,
            ref_counter = device.ref_counter,
            status = %device.status,
            "association deleted"
        );
        Ok(device)
    }
}

/// Remove a device row and its associations inside `txn`.
///
/// Returns the number of associations dropped, or `None` if the device
/// did not exist.
fn remove_device(txn: &WriteTransaction, device_id: &str) -> StateResult<Option<usize>> {
    let mut devices = txn.open_table(DEVICES).map_err(map_err!(Table))?;
    if devices.remove(device_id).map_err(map_err!(Write))?.is_none() {
        return Ok(None);
    }

    let mut associations = txn.open_table(ASSOCIATIONS).map_err(map_err!(Table))?;
    let mut orphaned_keys = Vec::new();
    for entry in associations.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        let assoc: ResourceAssociation = decode(value.value())?;
        if assoc.device_id == device_id {
            orphaned_keys.push(key.value().to_string());
        }
    }
    for key in &orphaned_keys {
        associations.remove(key.as_str()).map_err(map_err!(Write))?;
    }
    Ok(Some(orphaned_keys.len()))
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

//! Domain types for the device store.
//!
//! Devices and associations are persisted as JSON; resources are the
//! caller's descriptors and are never stored beyond their association.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a balancer device.
pub type DeviceId = String;

/// Identifier of a caller-owned logical resource (VIP, pool, member).
pub type ResourceId = String;

// ── Device ────────────────────────────────────────────────────────

/// Lifecycle status of a balancer device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    #[default]
    PendingCreate,
    Active,
    PendingUpdate,
    PendingDelete,
    Error,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::PendingCreate => "PENDING_CREATE",
            DeviceStatus::Active => "ACTIVE",
            DeviceStatus::PendingUpdate => "PENDING_UPDATE",
            DeviceStatus::PendingDelete => "PENDING_DELETE",
            DeviceStatus::Error => "ERROR",
        }
    }

    /// Whether new resources may still be associated with a device in this state.
    pub fn accepts_associations(&self) -> bool {
        !matches!(self, DeviceStatus::PendingDelete | DeviceStatus::Error)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend load-balancing instance shared by the resources of one tenant/subnet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalancerDevice {
    pub id: DeviceId,
    pub name: String,
    /// Backend implementation, e.g. `HAPROXY`.
    #[serde(rename = "type")]
    pub device_type: String,
    pub version: String,
    /// How to reach and administer the device. `Null` until provisioned.
    #[serde(default)]
    pub management: serde_json::Value,
    pub tenant_id: String,
    /// Bound on first association when the device was created without one.
    pub subnet_id: Option<String>,
    /// Number of live associations pointing at this device.
    pub ref_counter: u32,
    pub status: DeviceStatus,
    /// Unix timestamp (seconds) when the device row was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last change.
    pub updated_at: u64,
}

impl BalancerDevice {
    /// Whether `resource` may live on this device: same tenant, and the
    /// subnets agree unless one side has not bound a subnet yet.
    pub fn serves_scope_of(&self, resource: &ResourceRef) -> bool {
        self.tenant_id == resource.tenant_id && self.accepts_subnet(resource.subnet_id.as_deref())
    }

    pub fn accepts_subnet(&self, subnet_id: Option<&str>) -> bool {
        match (self.subnet_id.as_deref(), subnet_id) {
            (Some(bound), Some(wanted)) => bound == wanted,
            _ => true,
        }
    }
}

/// Full description of a device to create; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub version: String,
    #[serde(default)]
    pub management: serde_json::Value,
    pub tenant_id: String,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub status: DeviceStatus,
}

impl DeviceDescriptor {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("name", &self.name),
            ("type", &self.device_type),
            ("version", &self.version),
            ("tenant_id", &self.tenant_id),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} is required"));
            }
        }
        if self.subnet_id.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err("subnet_id must not be blank".to_string());
        }
        Ok(())
    }
}

/// Partial update of a device. Only management and status are mutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DevicePatch {
    #[serde(default)]
    pub management: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<DeviceStatus>,
}

// ── Association ───────────────────────────────────────────────────

/// Binding of one logical resource to the device serving it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceAssociation {
    pub resource_id: ResourceId,
    pub device_id: DeviceId,
    /// Unix timestamp (seconds) when the association was recorded.
    pub created_at: u64,
}

// ── Resource ──────────────────────────────────────────────────────

/// The caller's view of a resource to be placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceRef {
    pub id: ResourceId,
    pub tenant_id: String,
    /// A resource without a subnet matches any device subnet.
    #[serde(default)]
    pub subnet_id: Option<String>,
}

impl ResourceRef {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, subnet_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            subnet_id: subnet_id.map(str::to_string),
        }
    }
}

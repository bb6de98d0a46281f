//! Device eligibility for placement.
//!
//! A device qualifies for a resource when it is:
//! - **Active**: provisioning has been confirmed
//! - **Of the right type**: when the policy constrains the device type
//! - **In scope**: same tenant, and the same subnet unless one side is unbound
//! - **Below capacity**: fewer than `resource_limit` associated resources

use std::fmt;

use lbgrid_state::{BalancerDevice, DeviceStatus, ResourceRef};

use crate::policy::PlacementPolicy;

/// Why a device was passed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotActive,
    TypeMismatch,
    TenantMismatch,
    SubnetMismatch,
    Saturated,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rejection::NotActive => "not active",
            Rejection::TypeMismatch => "type mismatch",
            Rejection::TenantMismatch => "different tenant",
            Rejection::SubnetMismatch => "different subnet",
            Rejection::Saturated => "saturated",
        })
    }
}

/// Check whether `device` may host `resource` under `policy`.
pub fn check_device(
    device: &BalancerDevice,
    resource: &ResourceRef,
    policy: &PlacementPolicy,
) -> Result<(), Rejection> {
    if device.status != DeviceStatus::Active {
        return Err(Rejection::NotActive);
    }
    if let Some(wanted) = &policy.device_type {
        if &device.device_type != wanted {
            return Err(Rejection::TypeMismatch);
        }
    }
    if device.tenant_id != resource.tenant_id {
        return Err(Rejection::TenantMismatch);
    }
    if !device.accepts_subnet(resource.subnet_id.as_deref()) {
        return Err(Rejection::SubnetMismatch);
    }
    if device.ref_counter >= policy.resource_limit {
        return Err(Rejection::Saturated);
    }
    Ok(())
}

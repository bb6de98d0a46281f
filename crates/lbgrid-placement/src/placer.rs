//! Least-loaded device selection.
//!
//! Given a snapshot of devices, the placer:
//! 1. Drops devices that fail [`check_device`]
//! 2. Picks the survivor with the fewest associated resources
//! 3. Breaks ties on device id, so the same snapshot always yields the same device
//!
//! This is greedy bin-packing, not a global optimum; a fresh device is
//! cheap, so saturation is resolved by provisioning rather than packing.

use tracing::debug;

use lbgrid_state::{BalancerDevice, ResourceRef};

use crate::filter::check_device;
use crate::policy::PlacementPolicy;

/// Outcome of a placement attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Found(BalancerDevice),
    /// No existing device qualifies; a new one has to be provisioned.
    NoValidDevice,
}

impl Placement {
    pub fn into_device(self) -> Option<BalancerDevice> {
        match self {
            Placement::Found(device) => Some(device),
            Placement::NoValidDevice => None,
        }
    }
}

/// Select the least-loaded eligible device for `resource`.
pub fn select(
    resource: &ResourceRef,
    devices: &[BalancerDevice],
    policy: &PlacementPolicy,
) -> Placement {
    if devices.is_empty() {
        debug!(resource_id = %resource.id, "no devices registered");
        return Placement::NoValidDevice;
    }

    let best = devices
        .iter()
        .filter(|device| match check_device(device, resource, policy) {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    device_id = %device.id,
                    resource_id = %resource.id,
                    %reason,
                    "device rejected"
                );
                false
            }
        })
        .min_by(|a, b| a.ref_counter.cmp(&b.ref_counter).then_with(|| a.id.cmp(&b.id)));

    match best {
        Some(device) => {
            debug!(
                device_id = %device.id,
                resource_id = %resource.id,
                ref_counter = device.ref_counter,
                "found device for resource"
            );
            Placement::Found(device.clone())
        }
        None => Placement::NoValidDevice,
    }
}

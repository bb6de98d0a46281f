//! Control channel — sends device commands to drivers.
//!
//! Commands are fire-and-forget from the scheduler's point of view. The
//! driver runs on the blocking pool; whatever it reports is turned into a
//! [`DeviceConfirmation`] and pushed onto the confirmation channel. A
//! driver that defers produces nothing here: its agent confirms later.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use lbgrid_state::BalancerDevice;

use crate::confirmation::{ConfirmStatus, DeviceConfirmation};
use crate::driver::{DriverRegistry, DriverResponse};
use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Provision,
    Teardown,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Provision => "provision",
            Command::Teardown => "teardown",
        })
    }
}

#[derive(Clone)]
pub struct ControlChannel {
    registry: Arc<DriverRegistry>,
    confirmations: mpsc::Sender<DeviceConfirmation>,
}

impl ControlChannel {
    pub fn new(registry: Arc<DriverRegistry>, confirmations: mpsc::Sender<DeviceConfirmation>) -> Self {
        Self {
            registry,
            confirmations,
        }
    }

    /// Ask the device's driver to bring the backend up.
    pub async fn provision(&self, device: &BalancerDevice) -> SchedulerResult<()> {
        self.dispatch(Command::Provision, device).await
    }

    /// Ask the device's driver to tear the backend down.
    pub async fn teardown(&self, device: &BalancerDevice) -> SchedulerResult<()> {
        self.dispatch(Command::Teardown, device).await
    }

    async fn dispatch(&self, command: Command, device: &BalancerDevice) -> SchedulerResult<()> {
        debug!(device_id = %device.id, %command, "dispatching device command");

        let outcome = match self.registry.driver_for(device) {
            Ok(driver) => {
                let device = device.clone();
                tokio::task::spawn_blocking(move || match command {
                    Command::Provision => driver.provision(&device),
                    Command::Teardown => driver.teardown(&device),
                })
                .await
                .unwrap_or_else(|join_err| Err(format!("driver task failed: {join_err}")))
            }
            Err(e) => Err(e.to_string()),
        };

        let confirmation = match outcome {
            Ok(DriverResponse::Deferred) => return Ok(()),
            Ok(DriverResponse::Completed(management)) => DeviceConfirmation {
                device_id: device.id.clone(),
                status: ConfirmStatus::Ok,
                management: Some(management),
                message: String::new(),
            },
            Err(message) => {
                error!(device_id = %device.id, %command, %message, "driver reported an error");
                DeviceConfirmation {
                    device_id: device.id.clone(),
                    status: ConfirmStatus::Error,
                    management: None,
                    message,
                }
            }
        };

        self.confirmations.send(confirmation).await.map_err(|_| {
            warn!(device_id = %device.id, "confirmation channel closed");
            SchedulerError::Driver("confirmation channel closed".to_string())
        })
    }
}

//! Device confirmations from the control channel.
//!
//! A confirmation reports the outcome of a provisioning or teardown
//! command. They arrive asynchronously on an mpsc channel and are applied
//! one at a time by the [`ConfirmationListener`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use lbgrid_state::{BalancerDevice, DeviceId};

use crate::scheduler::BalancerScheduler;

/// Outcome reported by a driver or agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfirmStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfirmation {
    pub device_id: DeviceId,
    pub status: ConfirmStatus,
    /// Management info produced by provisioning, if any.
    #[serde(default)]
    pub management: Option<serde_json::Value>,
    #[serde(default)]
    pub message: String,
}

/// What applying a confirmation did to the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "device", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Updated(BalancerDevice),
    Deleted(DeviceId),
}

/// Applies confirmations from a channel until it closes or shutdown fires.
pub struct ConfirmationListener {
    scheduler: Arc<BalancerScheduler>,
}

impl ConfirmationListener {
    pub fn new(scheduler: Arc<BalancerScheduler>) -> Self {
        Self { scheduler }
    }

    /// Run the listener loop. Returns the number of confirmations applied.
    ///
    /// A confirmation that fails to apply is logged and skipped.
    pub async fn run(
        self,
        mut confirmations: mpsc::Receiver<DeviceConfirmation>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        info!("confirmation listener started");
        let mut applied = 0u64;

        loop {
            tokio::select! {
                msg = confirmations.recv() => {
                    let Some(confirmation) = msg else {
                        debug!("confirmation channel closed");
                        break;
                    };
                    match self.scheduler.apply_confirmation(&confirmation) {
                        Ok(outcome) => {
                            applied += 1;
                            debug!(device_id = %confirmation.device_id, ?outcome, "confirmation applied");
                        }
                        Err(e) => {
                            warn!(
                                device_id = %confirmation.device_id,
                                status = ?confirmation.status,
                                error = %e,
                                "failed to apply device confirmation"
                            );
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("confirmation listener shutting down");
                    break;
                }
            }
        }

        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbgrid_core::{DriverIdentity, SchedulerConfig};
    use lbgrid_state::{DeviceStatus, DeviceStore, ResourceRef};

    use crate::driver::{DriverRegistry, ExternalDriver};

    fn test_scheduler() -> Arc<BalancerScheduler> {
        let mut registry = DriverRegistry::new();
        registry
            .register(Arc::new(ExternalDriver::new(DriverIdentity::haproxy())))
            .unwrap();
        let store = DeviceStore::open_in_memory().unwrap();
        Arc::new(BalancerScheduler::new(store, &SchedulerConfig::default(), &registry).unwrap())
    }

    #[test]
    fn status_wire_format() {
        assert_eq!(serde_json::to_string(&ConfirmStatus::Ok).unwrap(), "\"OK\"");
        let parsed: DeviceConfirmation =
            serde_json::from_str(r#"{"device_id":"d1","status":"ERROR"}"#).unwrap();
        assert_eq!(parsed.status, ConfirmStatus::Error);
        assert!(parsed.management.is_none());
        assert!(parsed.message.is_empty());
    }

    #[tokio::test]
    async fn listener_applies_until_channel_closes() {
        let scheduler = test_scheduler();
        let device = scheduler
            .add_resource_association(&ResourceRef::new("r1", "t1", Some("s1")))
            .unwrap();

        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = ConfirmationListener::new(scheduler.clone());
        let handle = tokio::spawn(listener.run(rx, shutdown_rx));

        tx.send(DeviceConfirmation {
            device_id: device.id.clone(),
            status: ConfirmStatus::Ok,
            management: Some(serde_json::json!({"namespace": "lb-1"})),
            message: String::new(),
        })
        .await
        .unwrap();
        // Unknown devices are logged and skipped.
        tx.send(DeviceConfirmation {
            device_id: "missing".to_string(),
            status: ConfirmStatus::Ok,
            management: None,
            message: String::new(),
        })
        .await
        .unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 1);
        let device = scheduler.get_device(&device.id).unwrap();
        assert_eq!(device.status, DeviceStatus::Active);
        assert_eq!(device.management["namespace"], "lb-1");
    }

    #[tokio::test]
    async fn listener_stops_on_shutdown() {
        let scheduler = test_scheduler();
        let (_tx, rx) = mpsc::channel::<DeviceConfirmation>(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(ConfirmationListener::new(scheduler).run(rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 0);
    }
}

//! lbgrid-scheduler — resource-to-device scheduling for load balancers.
//!
//! Sits between the callers that own logical resources and the device
//! store. The scheduler:
//!
//! - Places resources on the least-loaded eligible device
//! - Provisions new devices when every candidate is saturated or foreign
//! - Flags drained devices for teardown
//! - Routes provisioning and teardown commands to registered drivers
//! - Applies the confirmations drivers send back
//!
//! # Architecture
//!
//! ```text
//! BalancerScheduler
//!   ├── DeviceManager (capacity policy)
//!   │     └── DeviceStore (devices + associations, transactional)
//!   └── PlacementPolicy (least-loaded selection)
//!
//! ControlChannel ── DriverRegistry ── DeviceDriver
//!       │
//!       └── mpsc ──> ConfirmationListener ──> BalancerScheduler
//! ```

pub mod confirmation;
pub mod control;
pub mod device_manager;
pub mod driver;
pub mod error;
pub mod scheduler;

pub use confirmation::{ConfirmOutcome, ConfirmStatus, ConfirmationListener, DeviceConfirmation};
pub use control::ControlChannel;
pub use device_manager::DeviceManager;
pub use driver::{DeviceDriver, DriverRegistry, DriverResponse, ExternalDriver};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::BalancerScheduler;

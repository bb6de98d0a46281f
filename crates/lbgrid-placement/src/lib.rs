//! lbgrid placement — choose an existing balancer device for a resource.
//!
//! Pure and side-effect free: callers pass a snapshot of devices and get
//! back a [`Placement`]. Finding no device is an ordinary outcome, not an
//! error; the scheduler reacts to it by provisioning a fresh device.
//!
//! # Components
//!
//! - **`filter`**: per-device eligibility (status, type, scope, capacity)
//! - **`placer`**: least-loaded selection over eligible devices
//! - **`policy`**: placement knobs and their conversion from config

pub mod filter;
pub mod placer;
pub mod policy;

pub use filter::{Rejection, check_device};
pub use placer::{Placement, select};
pub use policy::PlacementPolicy;

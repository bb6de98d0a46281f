//! lbgrid-state — durable store for load-balancer devices.
//!
//! Backed by [redb](https://docs.rs/redb). Holds two tables: balancer
//! devices keyed by device id, and resource associations keyed by the
//! caller's resource id. Both are JSON-serialized into `&[u8]` columns.
//!
//! Compound mutations (adding or removing an association, deleting a
//! device with its associations) run inside a single write transaction,
//! so a half-applied change is never observable. redb admits one writer
//! at a time, which serializes every mutation touching a device.
//!
//! The `DeviceStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::DeviceStore;
pub use types::*;

pub mod config;
pub mod types;

pub use config::{BackendConfig, ConfigError, PlacementConfig, SchedulerConfig, StoreConfig};
pub use types::*;

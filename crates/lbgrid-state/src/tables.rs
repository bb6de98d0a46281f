//! redb table definitions for the device store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Balancer devices keyed by `{device_id}`.
pub const DEVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");

/// Resource associations keyed by `{resource_id}`.
pub const ASSOCIATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("associations");

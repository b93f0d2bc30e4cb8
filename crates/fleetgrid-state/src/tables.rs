//! redb table definitions for the FleetGrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Pools keyed by `{pool_name}`.
pub const POOLS: TableDefinition<&str, &[u8]> = TableDefinition::new("pools");

/// Scale sets keyed by `{pool_name}:{scaleset_id}`.
pub const SCALESETS: TableDefinition<&str, &[u8]> = TableDefinition::new("scalesets");

/// Tasks keyed by `{task_id}`.
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

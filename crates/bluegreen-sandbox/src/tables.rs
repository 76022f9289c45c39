//! redb table definitions for the sandbox platform.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Environment records keyed by environment id.
pub const ENVIRONMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("environments");

/// Events keyed by `{environment_id}:{timestamp:020}:{seq}`.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");

/// Listeners keyed by listener arn.
pub const LISTENERS: TableDefinition<&str, &[u8]> = TableDefinition::new("listeners");

/// Listener rules (with their tags) keyed by rule arn.
pub const RULES: TableDefinition<&str, &[u8]> = TableDefinition::new("rules");

/// Backend pools keyed by pool arn.
pub const POOLS: TableDefinition<&str, &[u8]> = TableDefinition::new("pools");

/// Autoscaling groups keyed by name.
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// Application versions keyed by `{application}/{label}`.
pub const VERSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("versions");

/// Counters: `next_id` and `clock`.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

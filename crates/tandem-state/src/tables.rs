//! redb table definitions for the Tandem order table.
//!
//! Values are JSON-serialized domain types in `&[u8]` columns.

use redb::TableDefinition;

/// Orders keyed by numeric order id; iteration yields ascending ids.
pub const ORDERS: TableDefinition<u64, &[u8]> = TableDefinition::new("orders");

/// Orchestration hosts keyed by host id.
pub const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");

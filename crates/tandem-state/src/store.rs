//! OrderStore — redb-backed persistence for Tandem orders and hosts.
//!
//! Orders are JSON-serialized into a `u64 → &[u8]` table so iteration
//! yields ascending ids, which fixes the health monitor's processing
//! order. Partial updates go through [`OrderPatch`] and stay inside one
//! write transaction. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Map a redb or serde error into the named `StateError` variant.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe order store backed by redb.
#[derive(Clone)]
pub struct OrderStore {
    db: Arc<Database>,
}

impl OrderStore {
    /// Open (or create) a persistent order store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "order store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory order store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory order store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ORDERS).map_err(map_err!(Table))?;
        txn.open_table(HOSTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Orders ─────────────────────────────────────────────────────

    /// Insert a new order. The id is assigned inside the write
    /// transaction (highest existing id + 1), so concurrent creates
    /// cannot collide.
    pub fn create(&self, new: NewOrder) -> StateResult<Order> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let order;
        {
            let mut table = txn.open_table(ORDERS).map_err(map_err!(Table))?;
            let next_id = table
                .last()
                .map_err(map_err!(Read))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(1);
            order = new.into_order(next_id);
            let value = serde_json::to_vec(&order).map_err(map_err!(Serialize))?;
            table
                .insert(order.id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(order_id = order.id, pair = %order.pair_name, "order created");
        Ok(order)
    }

    /// Get an order by id.
    pub fn get(&self, id: OrderId) -> StateResult<Option<Order>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ORDERS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let order: Order =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    /// List all orders, ascending by id.
    pub fn select_all(&self) -> StateResult<Vec<Order>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ORDERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let order: Order =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(order);
        }
        Ok(results)
    }

    /// Apply a partial patch to a stored order. Read-modify-write in a
    /// single write transaction; fields the patch leaves `None` keep
    /// their stored value. Returns the patched row.
    pub fn update(&self, id: OrderId, patch: &OrderPatch) -> StateResult<Order> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let order;
        {
            let mut table = txn.open_table(ORDERS).map_err(map_err!(Table))?;
            let mut current: Order = {
                match table.get(id).map_err(map_err!(Read))? {
                    Some(guard) => serde_json::from_slice(guard.value())
                        .map_err(map_err!(Deserialize))?,
                    None => return Err(StateError::OrderNotFound(id)),
                }
            };
            patch.apply(&mut current);
            let value = serde_json::to_vec(&current).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            order = current;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(order)
    }

    /// Delete an order by id. Returns true if it existed.
    pub fn delete(&self, id: OrderId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ORDERS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(order_id = id, existed, "order deleted");
        Ok(existed)
    }

    /// Every member address recorded in the table. Input for lease
    /// snapshots; includes addresses of members currently down, since
    /// their replacements reuse them.
    pub fn member_addresses(&self) -> StateResult<Vec<String>> {
        let orders = self.select_all()?;
        Ok(orders
            .iter()
            .flat_map(|o| o.members.iter())
            .filter(|m| !m.address.is_empty())
            .map(|m| m.address.clone())
            .collect())
    }

    // ── Hosts ──────────────────────────────────────────────────────

    /// Insert or update a host registry entry.
    pub fn put_host(&self, host: &HostInfo) -> StateResult<()> {
        let value = serde_json::to_vec(host).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            table
                .insert(host.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a host by id.
    pub fn get_host(&self, host_id: &str) -> StateResult<Option<HostInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        match table.get(host_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let host: HostInfo =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(host))
            }
            None => Ok(None),
        }
    }

    /// List all registered hosts.
    pub fn list_hosts(&self) -> StateResult<Vec<HostInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let host: HostInfo =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(host);
        }
        Ok(results)
    }

    /// Delete a host by id. Returns true if it existed.
    pub fn delete_host(&self, host_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            existed = table.remove(host_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

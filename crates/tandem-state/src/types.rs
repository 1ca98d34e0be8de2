//! Domain types for the Tandem order table.
//!
//! An order is a managed replicated pair. The table stores the requested
//! shape (owner, label, memory budget) together with the last-observed
//! condition of both members; the health monitor is the only writer of
//! the observed fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tandem_core::{Availability, NodeMetrics, ReplicationStatus};

/// Unique numeric identifier for an order, assigned by the table.
pub type OrderId = u64;

// ── Order ──────────────────────────────────────────────────────────

/// A managed replicated pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Immutable numeric key.
    pub id: OrderId,
    /// Opaque requester identifier.
    pub owner: String,
    /// Human-readable pair label.
    pub pair_name: String,
    /// Memory budget per member, in GiB.
    pub memsize: f64,
    /// The two members, in pair order.
    pub members: [NodeRecord; 2],
    pub state: OrderState,
}

/// Order lifecycle state.
///
/// `Checking` marks an order the health monitor is currently working on;
/// at quiescence every order is `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Ready,
    Checking,
}

/// One member instance of a pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    /// Container id as reported by the runtime.
    pub container_id: String,
    /// Bare IPv4 address on the managed network.
    pub address: String,
    /// Orchestration host this member runs on.
    pub host_id: String,
    /// Last-observed memory metrics.
    pub metrics: NodeMetrics,
    /// Last-observed replication link state.
    pub replication: ReplicationStatus,
    pub availability: Availability,
}

impl NodeRecord {
    /// A freshly provisioned member: no observations yet, availability
    /// starts `Down` until the first health pass confirms it.
    pub fn fresh(container_id: &str, address: &str, host_id: &str) -> Self {
        Self {
            container_id: container_id.to_string(),
            address: address.to_string(),
            host_id: host_id.to_string(),
            metrics: NodeMetrics::default(),
            replication: ReplicationStatus::default(),
            availability: Availability::Down,
        }
    }
}

/// Partial update of an order row.
///
/// Only the populated fields are rewritten; everything else in the stored
/// row is left as-is. Applied in a single write transaction by
/// [`crate::store::OrderStore::update`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    pub state: Option<OrderState>,
    pub members: Option<[NodeRecord; 2]>,
}

impl OrderPatch {
    pub fn state(state: OrderState) -> Self {
        Self {
            state: Some(state),
            members: None,
        }
    }

    pub fn members(members: [NodeRecord; 2]) -> Self {
        Self {
            state: None,
            members: Some(members),
        }
    }

    /// Overwrite the populated fields on `order`.
    pub fn apply(&self, order: &mut Order) {
        if let Some(state) = self.state {
            order.state = state;
        }
        if let Some(members) = &self.members {
            order.members = members.clone();
        }
    }
}

/// Input for creating an order; the table assigns the id and the initial
/// `Ready` state.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub owner: String,
    pub pair_name: String,
    pub memsize: f64,
    pub members: [NodeRecord; 2],
}

impl NewOrder {
    pub(crate) fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            owner: self.owner,
            pair_name: self.pair_name,
            memsize: self.memsize,
            members: self.members,
            state: OrderState::Ready,
        }
    }
}

// ── Hosts ──────────────────────────────────────────────────────────

/// An orchestration host registered with the supervisor.
///
/// Single-host installs carry one `local` entry; the registry exists so
/// members can later be spread across hosts without a schema change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostInfo {
    pub id: String,
    pub address: String,
    /// Arbitrary labels for future placement decisions.
    pub labels: HashMap<String, String>,
}

// ── Derived health ─────────────────────────────────────────────────

/// Read-only pair classification for display layers. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthSummary {
    Ok,
    Degraded,
    Down,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthSummary::Ok => write!(f, "OK"),
            HealthSummary::Degraded => write!(f, "Degraded"),
            HealthSummary::Down => write!(f, "Down"),
        }
    }
}

impl Order {
    /// Classify the pair from its last-observed member condition.
    pub fn health_summary(&self) -> HealthSummary {
        let up = self
            .members
            .iter()
            .filter(|m| m.availability.is_up())
            .count();
        if up == 0 {
            return HealthSummary::Down;
        }
        let replicating = self
            .members
            .iter()
            .all(|m| m.replication.is_working());
        if up == self.members.len() && replicating {
            HealthSummary::Ok
        } else {
            HealthSummary::Degraded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(address: &str, up: bool, working: bool) -> NodeRecord {
        NodeRecord {
            availability: if up {
                Availability::Up
            } else {
                Availability::Down
            },
            replication: if working {
                ReplicationStatus::Working
            } else {
                ReplicationStatus::Error
            },
            ..NodeRecord::fresh("c-1", address, "local")
        }
    }

    fn order(members: [NodeRecord; 2]) -> Order {
        Order {
            id: 1,
            owner: "bob".to_string(),
            pair_name: "cache for Bob".to_string(),
            memsize: 0.5,
            members,
            state: OrderState::Ready,
        }
    }

    #[test]
    fn fresh_member_starts_down() {
        let rec = NodeRecord::fresh("c-9", "10.0.0.2", "local");
        assert!(!rec.availability.is_up());
        assert!(!rec.replication.is_working());
        assert_eq!(rec.metrics.quota_used, 0);
    }

    #[test]
    fn patch_applies_only_populated_fields() {
        let mut ord = order([
            member("10.0.0.2", true, true),
            member("10.0.0.3", true, true),
        ]);
        OrderPatch::state(OrderState::Checking).apply(&mut ord);
        assert_eq!(ord.state, OrderState::Checking);
        assert_eq!(ord.members[0].address, "10.0.0.2");

        let replaced = [
            member("10.0.0.2", true, true),
            member("10.0.0.3", false, false),
        ];
        OrderPatch::members(replaced.clone()).apply(&mut ord);
        // State untouched by a members-only patch.
        assert_eq!(ord.state, OrderState::Checking);
        assert_eq!(ord.members, replaced);
    }

    #[test]
    fn health_summary_classification() {
        let ok = order([
            member("10.0.0.2", true, true),
            member("10.0.0.3", true, true),
        ]);
        assert_eq!(ok.health_summary(), HealthSummary::Ok);

        let one_down = order([
            member("10.0.0.2", true, true),
            member("10.0.0.3", false, false),
        ]);
        assert_eq!(one_down.health_summary(), HealthSummary::Degraded);

        let diverged = order([
            member("10.0.0.2", true, true),
            member("10.0.0.3", true, false),
        ]);
        assert_eq!(diverged.health_summary(), HealthSummary::Degraded);

        let gone = order([
            member("10.0.0.2", false, false),
            member("10.0.0.3", false, false),
        ]);
        assert_eq!(gone.health_summary(), HealthSummary::Down);
        assert_eq!(gone.health_summary().to_string(), "Down");
    }
}
